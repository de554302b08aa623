//! Device classification and the provider-app deep link.

use anyhow::{Context, Result};
use regex::Regex;
use url::Url;

pub const UNIVERSAL_LINK: &str = "https://app.bankid.com/";
pub const APP_SCHEME: &str = "bankid:///";

/// Decides whether a client should be sent to the provider app instead of
/// being shown the visual challenge.
pub trait DeviceClassifier: Send + Sync {
    fn is_mobile(&self, user_agent: &str) -> bool;
}

/// Default classifier: phones and tablets by user-agent substring.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAgentClassifier;

impl DeviceClassifier for UserAgentClassifier {
    fn is_mobile(&self, user_agent: &str) -> bool {
        Regex::new(r"(?i)iPhone|iPad|iPod|Android").is_ok_and(|re| re.is_match(user_agent))
    }
}

/// Platforms able to open the universal link; older ones need the app scheme.
#[must_use]
pub fn is_modern_platform(user_agent: &str) -> bool {
    Regex::new(r"Android 6|Android [7-9]|Android [1-9][0-9]|iOS|iPhone|iPad|iPod")
        .is_ok_and(|re| re.is_match(user_agent))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLinkConfig {
    pub universal_link: String,
    pub app_scheme: String,
}

impl Default for DeepLinkConfig {
    fn default() -> Self {
        Self {
            universal_link: UNIVERSAL_LINK.to_string(),
            app_scheme: APP_SCHEME.to_string(),
        }
    }
}

/// Build the link that launches the provider app with the transaction's
/// auto-start token. The return target is `null` when the caller has none.
///
/// # Errors
/// Returns an error if the configured link base is not a valid URL.
pub fn app_link(
    config: &DeepLinkConfig,
    auto_start_token: &str,
    return_url: Option<&str>,
    user_agent: &str,
) -> Result<Url> {
    let base = if is_modern_platform(user_agent) {
        &config.universal_link
    } else {
        &config.app_scheme
    };

    let mut url = Url::parse(base).with_context(|| format!("invalid app link base: {base}"))?;
    url.query_pairs_mut()
        .append_pair("autostarttoken", auto_start_token)
        .append_pair("redirect", return_url.unwrap_or("null"));

    Ok(url)
}
