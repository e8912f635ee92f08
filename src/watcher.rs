//! The poll-diff-notify loop. Runs on its own thread with blocking I/O;
//! the HTTP side talks to it through a control channel and a shared
//! status snapshot.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use color_eyre::Result;
use log::{error, info, warn};

use crate::config::{Config, FirstSeenPolicy};
use crate::diff;
use crate::discogs::{DiscogsClient, WantlistItem};
use crate::store::{ReleaseStats, Store};
use crate::telegram::{escape_html, Notifier};

const RECENT_CAPACITY: usize = 100;

#[derive(Debug)]
pub enum Command {
    PollNow,
    Pause,
    Resume,
    SendTest,
    Reset,
}

#[derive(Debug, Default, Clone)]
pub struct Status {
    pub policy: String,
    pub paused: bool,
    pub cycles: u64,
    pub releases_tracked: usize,
    pub seen_listings: usize,
    pub notifications_sent: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
    pub recent: VecDeque<String>,
}

impl Status {
    pub fn log_event(&mut self, line: impl Into<String>) {
        if self.recent.len() == RECENT_CAPACITY {
            self.recent.pop_front();
        }
        self.recent
            .push_back(format!("{} {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), line.into()));
    }
}

pub type SharedStatus = Arc<Mutex<Status>>;

pub struct Watcher {
    discogs: DiscogsClient,
    notifier: Notifier,
    store: Store,
    policy: FirstSeenPolicy,
    username: String,
    interval: Duration,
    status: SharedStatus,
    control: Receiver<Command>,
}

impl Watcher {
    pub fn new(
        config: &Config,
        store: Store,
        status: SharedStatus,
        control: Receiver<Command>,
    ) -> Result<Self> {
        {
            let mut st = status.lock().unwrap();
            st.policy = config.first_seen_policy.to_string();
            st.releases_tracked = store.releases_tracked();
            st.seen_listings = store.seen_count();
        }
        Ok(Self {
            discogs: DiscogsClient::new(config)?,
            notifier: Notifier::new(config)?,
            store,
            policy: config.first_seen_policy,
            username: config.discogs_username.clone(),
            interval: Duration::from_secs(config.check_interval_secs),
            status,
            control,
        })
    }

    /// Loop forever: poll, then park on the control channel so commands
    /// interrupt the sleep. Returns only when every sender is gone.
    pub fn run(mut self) {
        if let Err(e) = self.notifier.send("👂 Wantlist watcher started") {
            warn!("startup notice failed: {e:#}");
        }
        loop {
            while let Ok(command) = self.control.try_recv() {
                self.handle(command);
            }
            if !self.paused() {
                self.run_cycle();
            }
            match self.control.recv_timeout(self.interval) {
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("control channel closed, stopping watcher");
                    return;
                }
            }
        }
    }

    fn paused(&self) -> bool {
        self.status.lock().unwrap().paused
    }

    fn handle(&mut self, command: Command) {
        match command {
            // a manual trigger overrides pause
            Command::PollNow => {
                info!("manual poll requested");
                self.run_cycle();
            }
            Command::Pause => {
                let mut st = self.status.lock().unwrap();
                st.paused = true;
                st.log_event("watcher paused");
            }
            Command::Resume => {
                let mut st = self.status.lock().unwrap();
                st.paused = false;
                st.log_event("watcher resumed");
            }
            Command::SendTest => {
                if let Err(e) = self.notifier.send("🧪 Test message from wantlist watcher") {
                    warn!("test message failed: {e:#}");
                }
            }
            Command::Reset => {
                self.store.reset();
                if let Err(e) = self.store.persist() {
                    warn!("failed to persist reset state: {e:#}");
                }
                self.status.lock().unwrap().log_event("state reset");
                info!("seen set and stats cache reset");
            }
        }
    }

    /// One cycle plus bookkeeping. Errors are logged and reported, never
    /// propagated: the loop must survive anything the network throws at it.
    fn run_cycle(&mut self) {
        let outcome = match self.poll_once() {
            Ok(sent) => format!("ok, {sent} notification(s)"),
            Err(e) => {
                error!("poll cycle failed: {e:#}");
                let notice = format!("⚠️ Poll cycle failed: {}", escape_html(&format!("{e:#}")));
                if let Err(send_err) = self.notifier.send(&notice) {
                    warn!("could not report cycle failure: {send_err:#}");
                }
                format!("error: {e:#}")
            }
        };
        let mut st = self.status.lock().unwrap();
        st.cycles += 1;
        st.last_cycle_at = Some(Utc::now());
        st.last_outcome = Some(outcome);
        st.releases_tracked = self.store.releases_tracked();
        st.seen_listings = self.store.seen_count();
    }

    /// Fetch the wantlist and check every release. A failure on one
    /// release skips that release only; the store is persisted once at the
    /// end of the cycle.
    pub fn poll_once(&mut self) -> Result<u64> {
        let wantlist = self.discogs.fetch_wantlist(&self.username)?;
        info!("checking {} wantlist release(s)", wantlist.len());
        let mut sent = 0u64;
        for release in &wantlist {
            match self.check_release(release) {
                Ok(n) => sent += n,
                Err(e) => warn!("skipping release {} ({}): {e:#}", release.id, release.title),
            }
        }
        self.store.persist()?;
        if sent > 0 {
            info!("cycle done, sent {sent} notification(s)");
        }
        Ok(sent)
    }

    fn check_release(&mut self, release: &WantlistItem) -> Result<u64> {
        let stats = self.discogs.fetch_stats(release.id)?;
        if self.store.stats_for(release.id) == Some(ReleaseStats::from(&stats)) {
            return Ok(0);
        }
        let listings = if stats.num_for_sale > 0 {
            self.discogs.fetch_listings(release.id)?
        } else {
            Vec::new()
        };
        let events = diff::diff_release(release, &stats, &listings, &mut self.store, self.policy);
        let sent = diff::send_notifications(&self.notifier, &events)?;
        if !events.is_empty() {
            let mut st = self.status.lock().unwrap();
            st.notifications_sent += sent;
            for event in &events {
                st.log_event(event.describe());
            }
        }
        Ok(sent)
    }
}
