//! Authentication polling state machine.
//!
//! A [`Flow`] owns exactly one attempt. It can be driven by hand through
//! [`Flow::start`], [`Flow::on_tick`], [`Flow::on_poll_result`] and
//! [`Flow::cancel`], or handed to [`Flow::run`], which owns the three timers of
//! a pending attempt:
//!
//! * the status poll, every `poll_interval`, first tick one period after the
//!   transaction is opened;
//! * the challenge refresh, every `challenge_interval`, on its own phase;
//! * the one-shot app redirect for mobile clients, after `redirect_delay`.
//!
//! All of them are dropped as soon as the attempt leaves `pending` or is
//! cancelled. Every mutation republishes a [`FlowSnapshot`] on a watch channel.

pub mod log;
pub mod state;

pub use self::log::{LogEntry, StatusLog};
pub use self::state::{ErrorView, FlowSnapshot, FlowState};

use crate::{
    challenge::{self, ChallengeRenderer, ChallengeToken},
    device::{self, DeepLinkConfig, DeviceClassifier},
    error::FlowError,
    membership::{self, MembershipBridge, Resolution},
    notify::{login_redirect, HostMessage, HostNotifier},
    provider::{hint, CollectStatus, HintCode, IdProvider, IdentityResult, StatusReport, Transaction},
};
use chrono::Utc;
use std::{fmt, sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::{interval_at, sleep, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;
use url::Url;

pub const POLL_INTERVAL: Duration = Duration::from_millis(2_000);
pub const REDIRECT_DELAY: Duration = Duration::from_millis(100);

const INITIATING_MESSAGE: &str = "starting authentication";
const COMPLETE_MESSAGE: &str = "identity confirmed, signing in";
const LOGGED_IN_MESSAGE: &str = "signed in";
const FAILED_MESSAGE: &str = "authentication failed";
const PROVIDER_ERROR_MESSAGE: &str = "the ID provider reported an error";
const CANCELLED_MESSAGE: &str = "cancelled";

/// Collaborators of a flow, shared between attempts.
#[derive(Clone)]
pub struct FlowServices {
    pub provider: Arc<dyn IdProvider>,
    pub membership: MembershipBridge,
    pub notifier: Arc<dyn HostNotifier>,
    pub classifier: Arc<dyn DeviceClassifier>,
}

impl fmt::Debug for FlowServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowServices").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub poll_interval: Duration,
    pub challenge_interval: Duration,
    pub redirect_delay: Duration,
    pub deep_link: DeepLinkConfig,
    /// Host page that finishes the first-party login.
    pub login_redirect: Url,
}

impl FlowSettings {
    #[must_use]
    pub fn new(login_redirect: Url) -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            challenge_interval: challenge::REFRESH_INTERVAL,
            redirect_delay: REDIRECT_DELAY,
            deep_link: DeepLinkConfig::default(),
            login_redirect,
        }
    }
}

/// What is known about the browser running the attempt.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub user_agent: String,
    /// Page the provider app should return to; `None` sends `null`.
    pub return_url: Option<String>,
}

pub struct Flow {
    id: Ulid,
    services: FlowServices,
    settings: FlowSettings,
    client: ClientContext,
    state: FlowState,
    message: String,
    error: Option<FlowError>,
    transaction: Option<Transaction>,
    identity: Option<IdentityResult>,
    resolution: Option<Resolution>,
    renderer: Option<ChallengeRenderer>,
    challenge: Option<ChallengeToken>,
    app_link: Option<Url>,
    redirect: Option<String>,
    log: StatusLog,
    started: bool,
    login_complete: bool,
    notified: bool,
    cancelled: bool,
    snapshot_tx: watch::Sender<FlowSnapshot>,
}

impl Flow {
    #[must_use]
    pub fn new(services: FlowServices, settings: FlowSettings, client: ClientContext) -> Self {
        let id = Ulid::new();
        let (snapshot_tx, _) = watch::channel(FlowSnapshot {
            id: id.to_string(),
            state: FlowState::Initiating,
            message: INITIATING_MESSAGE.to_string(),
            error: None,
            transaction_id: None,
            challenge: None,
            redirect: None,
            identity: None,
            membership: None,
            session: None,
            login_complete: false,
            cancelled: false,
            log: Vec::new(),
            updated_at: Utc::now(),
        });

        Self {
            id,
            services,
            settings,
            client,
            state: FlowState::Initiating,
            message: INITIATING_MESSAGE.to_string(),
            error: None,
            transaction: None,
            identity: None,
            resolution: None,
            renderer: None,
            challenge: None,
            app_link: None,
            redirect: None,
            log: StatusLog::default(),
            started: false,
            login_complete: false,
            notified: false,
            cancelled: false,
            snapshot_tx,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Ulid {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> FlowState {
        self.state
    }

    #[must_use]
    pub const fn login_complete(&self) -> bool {
        self.login_complete
    }

    #[must_use]
    pub const fn log(&self) -> &StatusLog {
        &self.log
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.cancelled || self.state.is_terminal()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FlowSnapshot> {
        self.snapshot_tx.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            id: self.id.to_string(),
            state: self.state,
            message: self.message.clone(),
            error: self.error.as_ref().map(ErrorView::from),
            transaction_id: self
                .transaction
                .as_ref()
                .map(|transaction| transaction.transaction_id.clone()),
            challenge: self.challenge.clone(),
            redirect: self.redirect.clone(),
            identity: self.identity.clone(),
            membership: self.resolution.as_ref().map(Resolution::outcome),
            session: self
                .resolution
                .as_ref()
                .and_then(Resolution::session)
                .cloned(),
            login_complete: self.login_complete,
            cancelled: self.cancelled,
            log: self.log.entries().to_vec(),
            updated_at: Utc::now(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    /// Open the provider transaction. Only the first call has any effect, so an
    /// attempt never owns more than one transaction.
    pub async fn start(&mut self) {
        if self.started || self.cancelled {
            return;
        }
        self.started = true;
        self.log.push("Starting authentication");
        self.publish();

        match self.services.provider.start().await {
            Ok(transaction) => self.enter_pending(transaction),
            Err(err) => self.fail(err).await,
        }
    }

    fn enter_pending(&mut self, transaction: Transaction) {
        info!(transaction_id = %transaction.transaction_id, "transaction initiated");
        self.log.push(format!(
            "Transaction initiated (ref: {})",
            transaction.transaction_id
        ));
        self.state = FlowState::Pending;
        self.message = hint::DEFAULT_MESSAGE.to_string();

        let mobile = self.services.classifier.is_mobile(&self.client.user_agent);
        match (mobile, transaction.auto_start_token.as_deref()) {
            (true, Some(token)) => match device::app_link(
                &self.settings.deep_link,
                token,
                self.client.return_url.as_deref(),
                &self.client.user_agent,
            ) {
                Ok(link) => {
                    debug!(%link, "app link scheduled");
                    self.log.push("Opening the ID app on this device");
                    self.app_link = Some(link);
                }
                Err(err) => {
                    warn!("app link unavailable: {err:#}");
                    self.log.push(format!("App link unavailable: {err}"));
                }
            },
            (true, None) => self.log.push("No auto-start token, open the ID app manually"),
            (false, _) => {
                if let Some(reference) = transaction.challenge_ref.as_deref() {
                    self.log.push("Challenge received");
                    match ChallengeRenderer::with_period(reference, self.settings.challenge_interval)
                    {
                        Ok(mut renderer) => {
                            self.challenge = Some(renderer.current());
                            self.renderer = Some(renderer);
                        }
                        Err(err) => {
                            warn!("challenge unavailable: {err}");
                            self.log.push(format!("Challenge unavailable: {err}"));
                        }
                    }
                }
            }
        }

        self.transaction = Some(transaction);
        self.publish();
    }

    const fn accepts_poll(&self) -> bool {
        !self.login_complete && !self.cancelled && matches!(self.state, FlowState::Pending)
    }

    /// Poll-timer callback. A no-op once the completion latch is set or the
    /// attempt left `pending`.
    pub async fn on_tick(&mut self) {
        if let Some(result) = self.poll_status().await {
            self.on_poll_result(result).await;
        }
    }

    // Only the provider call itself; `None` when no poll is due.
    async fn poll_status(&self) -> Option<Result<StatusReport, FlowError>> {
        if !self.accepts_poll() {
            return None;
        }
        let transaction_id = self.transaction.as_ref()?.transaction_id.as_str();
        Some(self.services.provider.check(transaction_id).await)
    }

    /// Apply one poll result. Results arriving after the attempt left
    /// `pending` are dropped.
    pub async fn on_poll_result(&mut self, result: Result<StatusReport, FlowError>) {
        if !self.accepts_poll() {
            debug!("dropping stale poll result");
            return;
        }

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                self.fail(err).await;
                return;
            }
        };

        let hint = report.hint_code.as_ref();
        self.log.push(match hint {
            Some(code) => format!("Status: {} ({code})", report.status.as_str()),
            None => format!("Status: {}", report.status.as_str()),
        });

        match report.status {
            CollectStatus::Pending => {
                self.message = hint::status_message(hint).to_string();
                self.publish();
            }
            CollectStatus::Complete => match report.identity {
                Some(identity) => self.complete(identity).await,
                None => {
                    self.fail(FlowError::InvalidResponse(
                        "complete status without completion data".to_string(),
                    ))
                    .await;
                }
            },
            CollectStatus::Failed => {
                let message = terminal_message(hint, FAILED_MESSAGE);
                info!(hint = hint.map(HintCode::as_str), "authentication failed");
                self.stop_timers();
                self.state = FlowState::Failed;
                self.message = message.to_string();
                self.publish();
                self.notify(HostMessage::LoginError {
                    error: message.to_string(),
                })
                .await;
            }
            CollectStatus::Error => {
                let message = terminal_message(hint, PROVIDER_ERROR_MESSAGE);
                self.fail(FlowError::Provider(message.to_string())).await;
            }
        }
    }

    async fn complete(&mut self, identity: IdentityResult) {
        info!("identity confirmed");
        self.stop_timers();
        self.state = FlowState::Complete;
        self.message = COMPLETE_MESSAGE.to_string();
        self.identity = Some(identity.clone());
        self.log.push("Checking membership account");
        self.publish();

        let resolution = self.services.membership.resolve(&identity).await;

        if resolution.logged_in() {
            self.login_complete = true;
            self.message = LOGGED_IN_MESSAGE.to_string();
            self.log.push("Membership login successful");
            self.resolution = Some(resolution);
            self.publish();

            let redirect = login_redirect(&self.settings.login_redirect, &identity.subject_id);
            self.notify(HostMessage::LoginSuccess {
                personal_number: identity.subject_id,
                name: identity.display_name,
                redirect: redirect.into(),
            })
            .await;
        } else {
            let message = resolution
                .message()
                .unwrap_or_else(|| membership::USER_NOT_FOUND.to_string());
            self.log
                .push(format!("Membership verification failed: {message}"));
            self.message = message;
            self.resolution = Some(resolution);
            self.publish();

            self.notify(HostMessage::UserNotFound {
                personal_number: identity.subject_id,
                name: identity.display_name,
            })
            .await;
        }
    }

    async fn fail(&mut self, err: FlowError) {
        warn!(code = err.code(), "authentication error: {err}");
        self.stop_timers();
        self.state = FlowState::Error;
        self.message = err.to_string();
        self.log.push(format!("Error: {err}"));
        self.error = Some(err);
        self.publish();

        self.notify(HostMessage::LoginError {
            error: self.message.clone(),
        })
        .await;
    }

    // At most one host message per attempt.
    async fn notify(&mut self, message: HostMessage) {
        if self.notified {
            debug!(kind = message.kind(), "host already notified");
            return;
        }
        self.notified = true;
        self.log.push(format!("Notifying host: {}", message.kind()));

        if let Err(err) = self.services.notifier.notify(&message).await {
            warn!("host notification failed: {err:#}");
            self.log.push(format!("Host notification failed: {err}"));
        }
        self.publish();
    }

    fn on_challenge(&mut self, token: ChallengeToken) {
        if self.cancelled || self.state != FlowState::Pending {
            return;
        }
        self.challenge = Some(token);
        self.publish();
    }

    fn on_redirect(&mut self) {
        if self.cancelled || self.state != FlowState::Pending || self.redirect.is_some() {
            return;
        }
        if let Some(link) = &self.app_link {
            self.redirect = Some(link.to_string());
            self.log.push("Redirecting to the ID app");
            self.publish();
        }
    }

    fn stop_timers(&mut self) {
        self.renderer = None;
        self.challenge = None;
        self.app_link = None;
    }

    /// Abandon the attempt: timers stop and later callbacks are ignored.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.stop_timers();
        if !self.state.is_terminal() {
            info!("attempt cancelled");
            self.message = CANCELLED_MESSAGE.to_string();
            self.log.push("Cancelled");
        }
        self.publish();
    }

    /// Drive the attempt until it reaches a terminal state or `cancel` fires.
    /// Returns the final snapshot.
    #[instrument(skip_all, fields(flow_id = %self.id))]
    pub async fn run(mut self, cancel: CancellationToken) -> FlowSnapshot {
        tokio::select! {
            () = cancel.cancelled() => self.cancel(),
            () = self.start() => {}
        }

        let period = self.settings.poll_interval;
        let mut poll = interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let redirect_timer = sleep(self.settings.redirect_delay);
        tokio::pin!(redirect_timer);

        while !self.is_finished() {
            let redirect_due = self.app_link.is_some() && self.redirect.is_none();

            tokio::select! {
                () = cancel.cancelled() => self.cancel(),
                _ = poll.tick() => {
                    // A cancel may abort the provider call, but never the
                    // membership login and host message that follow it.
                    let polled = tokio::select! {
                        () = cancel.cancelled() => None,
                        polled = self.poll_status() => polled,
                    };
                    match polled {
                        Some(result) => self.on_poll_result(result).await,
                        None if cancel.is_cancelled() => self.cancel(),
                        None => {}
                    }
                }
                token = next_challenge(&mut self.renderer) => self.on_challenge(token),
                () = &mut redirect_timer, if redirect_due => self.on_redirect(),
            }
        }

        debug!(state = %self.state, cancelled = self.cancelled, "flow finished");
        self.snapshot()
    }
}

async fn next_challenge(renderer: &mut Option<ChallengeRenderer>) -> ChallengeToken {
    match renderer {
        Some(renderer) => renderer.next().await,
        None => std::future::pending().await,
    }
}

// Hint table message for recognised codes, otherwise the fallback.
fn terminal_message(hint: Option<&HintCode>, fallback: &'static str) -> &'static str {
    match hint {
        Some(HintCode::Other(_)) | None => fallback,
        Some(code) => code.message(),
    }
}
