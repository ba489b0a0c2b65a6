//! Async runtime for the party engine
//!
//! [`PartyRuntime`] runs a [`WatchParty`] on one task, interleaving user
//! commands, transport activity and the echo-suppression deadline.
//! [`PartyHandle`] is the cloneable front end; dropping the last handle
//! leaves the party and stops the task.

use std::sync::Arc;
use syncwatch_transport::PeerNetwork;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::clock::PlaybackClock;
use crate::config::PartyConfig;
use crate::engine::{Inbound, WatchParty};
use crate::error::{PartyError, Result};
use crate::event::{Notifier, PartyEvent};
use crate::status::PartyState;

enum Command {
    Start {
        identity: Option<String>,
        reply: oneshot::Sender<PartyState>,
    },
    Join {
        target: String,
        reply: oneshot::Sender<PartyState>,
    },
    End {
        reply: oneshot::Sender<PartyState>,
    },
    Control {
        action: Control,
        reply: oneshot::Sender<bool>,
    },
    SetCasting {
        casting: bool,
        reply: oneshot::Sender<()>,
    },
    AttachClock {
        clock: Box<dyn PlaybackClock>,
        reply: oneshot::Sender<()>,
    },
    CanChangeSpeed {
        reply: oneshot::Sender<bool>,
    },
    State {
        reply: oneshot::Sender<PartyState>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Toggle,
    Play,
    Pause,
    SeekBy(f64),
    SeekTo(f64),
    ScrubTo(f64),
}

/// Event loop owning one [`WatchParty`]
pub struct PartyRuntime {
    party: WatchParty,
    inbound: mpsc::Receiver<Inbound>,
    commands: mpsc::Receiver<Command>,
}

impl PartyRuntime {
    pub fn new(
        config: PartyConfig,
        network: Arc<dyn PeerNetwork>,
        clock: Option<Box<dyn PlaybackClock>>,
    ) -> (Self, PartyHandle) {
        let buffer = config.event_buffer.max(1);
        let (mut party, inbound) = WatchParty::new(config, network);
        if let Some(clock) = clock {
            party.attach_clock(clock);
        }
        let (tx, commands) = mpsc::channel(buffer);
        let handle = PartyHandle {
            commands: tx,
            notifier: party.notifier().clone(),
        };
        let runtime = Self {
            party,
            inbound,
            commands,
        };
        (runtime, handle)
    }

    /// Build a runtime and run it on the current tokio runtime
    pub fn spawn(
        config: PartyConfig,
        network: Arc<dyn PeerNetwork>,
        clock: Option<Box<dyn PlaybackClock>>,
    ) -> (PartyHandle, JoinHandle<()>) {
        let (runtime, handle) = Self::new(config, network, clock);
        let task = tokio::spawn(runtime.run());
        (handle, task)
    }

    pub async fn run(mut self) {
        debug!("party runtime started");
        loop {
            let deadline = self.party.echo_deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!("all party handles dropped");
                        self.party.end_party().await;
                        break;
                    }
                },
                Some(inbound) = self.inbound.recv() => self.party.dispatch(inbound).await,
                _ = echo_timer(deadline) => self.party.expire_echo(),
            }
        }
        debug!("party runtime stopped");
    }

    /// Returns false once the runtime should stop
    async fn handle(&mut self, command: Command) -> bool {
        let party = &mut self.party;
        match command {
            Command::Start { identity, reply } => {
                party.start_party(identity.as_deref()).await;
                let _ = reply.send(party.state());
            }
            Command::Join { target, reply } => {
                party.join_party(&target).await;
                let _ = reply.send(party.state());
            }
            Command::End { reply } => {
                party.end_party().await;
                let _ = reply.send(party.state());
            }
            Command::Control { action, reply } => {
                let done = match action {
                    Control::Toggle => party.toggle_play_pause().await,
                    Control::Play => party.play().await,
                    Control::Pause => party.pause().await,
                    Control::SeekBy(delta) => party.seek_by(delta).await,
                    Control::SeekTo(time) => party.seek_to(time).await,
                    Control::ScrubTo(fraction) => party.scrub_to(fraction).await,
                };
                let _ = reply.send(done);
            }
            Command::SetCasting { casting, reply } => {
                party.set_casting(casting);
                let _ = reply.send(());
            }
            Command::AttachClock { clock, reply } => {
                party.attach_clock(clock);
                let _ = reply.send(());
            }
            Command::CanChangeSpeed { reply } => {
                let _ = reply.send(party.can_change_speed());
            }
            Command::State { reply } => {
                let _ = reply.send(party.state());
            }
            Command::Shutdown { reply } => {
                party.end_party().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }
}

async fn echo_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable front end to a running [`PartyRuntime`]
#[derive(Clone)]
pub struct PartyHandle {
    commands: mpsc::Sender<Command>,
    notifier: Notifier,
}

impl PartyHandle {
    async fn request<T, F>(&self, make: F) -> Result<T>
    where
        F: FnOnce(oneshot::Sender<T>) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| PartyError::RuntimeStopped)?;
        rx.await.map_err(|_| PartyError::RuntimeStopped)
    }

    async fn control(&self, action: Control) -> Result<bool> {
        self.request(|reply| Command::Control { action, reply })
            .await
    }

    /// Host a party, under `identity` if given
    pub async fn start_party(&self, identity: Option<&str>) -> Result<PartyState> {
        let identity = identity.map(str::to_string);
        self.request(|reply| Command::Start { identity, reply }).await
    }

    /// Join by party id or share link
    pub async fn join_party(&self, target: &str) -> Result<PartyState> {
        let target = target.to_string();
        self.request(|reply| Command::Join { target, reply }).await
    }

    pub async fn end_party(&self) -> Result<PartyState> {
        self.request(|reply| Command::End { reply }).await
    }

    pub async fn toggle_play_pause(&self) -> Result<bool> {
        self.control(Control::Toggle).await
    }

    pub async fn play(&self) -> Result<bool> {
        self.control(Control::Play).await
    }

    pub async fn pause(&self) -> Result<bool> {
        self.control(Control::Pause).await
    }

    pub async fn seek_by(&self, delta: f64) -> Result<bool> {
        self.control(Control::SeekBy(delta)).await
    }

    pub async fn seek_to(&self, time: f64) -> Result<bool> {
        self.control(Control::SeekTo(time)).await
    }

    pub async fn scrub_to(&self, fraction: f64) -> Result<bool> {
        self.control(Control::ScrubTo(fraction)).await
    }

    pub async fn set_casting(&self, casting: bool) -> Result<()> {
        self.request(|reply| Command::SetCasting { casting, reply })
            .await
    }

    pub async fn attach_clock(&self, clock: Box<dyn PlaybackClock>) -> Result<()> {
        self.request(|reply| Command::AttachClock { clock, reply })
            .await
    }

    pub async fn can_change_speed(&self) -> Result<bool> {
        self.request(|reply| Command::CanChangeSpeed { reply }).await
    }

    pub async fn state(&self) -> Result<PartyState> {
        self.request(|reply| Command::State { reply }).await
    }

    /// Receive every party event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PartyEvent> {
        self.notifier.subscribe()
    }

    /// Install the event callback, replacing any previous one
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(&PartyEvent) + Send + Sync + 'static,
    {
        self.notifier.observer().set(callback);
    }

    pub fn clear_event_callback(&self) {
        self.notifier.observer().clear();
    }

    /// Leave the party and stop the runtime
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

impl std::fmt::Debug for PartyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartyHandle")
            .field("running", &self.is_running())
            .finish()
    }
}
