pub mod flows;
pub mod health;

pub use self::health::health;
