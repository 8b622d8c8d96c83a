//! Control thread
//!
//! The single owner of the [`TransportController`]. UI commands, session
//! notifications, engine events and progress ticks all arrive as channel
//! messages and are applied one at a time on this thread, so no transport
//! state is ever touched from anywhere else.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};

use crate::engine::offline::RenderedArtifact;
use crate::engine::transport::{PlaybackStatus, TransportController};
use crate::error::{EngineError, Result};
use crate::session::events::SessionEvent;
use crate::session::route::RouteMonitor;

/// Requests from the UI collaborator, each with its reply channel
enum Command {
    Play(Sender<Result<()>>),
    Stop(Sender<Result<()>>),
    TogglePlay(Sender<Result<()>>),
    Render(Sender<Result<RenderedArtifact>>),
    SetPitch(f32, Sender<()>),
    Session(SessionEvent, Sender<Result<()>>),
    Status(Sender<PlaybackStatus>),
    Subscribe(Sender<Receiver<PlaybackStatus>>),
    Shutdown,
}

/// UI side of a running control loop; cheap to clone
#[derive(Clone)]
pub struct ControlHandle {
    commands: Sender<Command>,
}

impl ControlHandle {
    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(make(reply_tx))
            .map_err(|_| EngineError::Disconnected)?;
        reply_rx.recv().map_err(|_| EngineError::Disconnected)
    }

    pub fn play(&self) -> Result<()> {
        self.request(Command::Play)?
    }

    pub fn stop(&self) -> Result<()> {
        self.request(Command::Stop)?
    }

    pub fn toggle_play(&self) -> Result<()> {
        self.request(Command::TogglePlay)?
    }

    /// Render offline; blocks until the render is done
    pub fn render(&self) -> Result<RenderedArtifact> {
        self.request(Command::Render)?
    }

    pub fn set_pitch(&self, cents: f32) -> Result<()> {
        self.request(|reply| Command::SetPitch(cents, reply))
    }

    /// Deliver a session notification in order with the other commands
    ///
    /// Platform producers can use the loop's session channel instead; this
    /// is for callers that need the notification applied before their next
    /// command, such as scripted replays.
    pub fn notify(&self, event: SessionEvent) -> Result<()> {
        self.request(|reply| Command::Session(event, reply))?
    }

    pub fn status(&self) -> Result<PlaybackStatus> {
        self.request(Command::Status)
    }

    /// Receive every status the transport publishes from now on
    pub fn subscribe(&self) -> Result<Receiver<PlaybackStatus>> {
        self.request(Command::Subscribe)
    }

    /// Ask the loop to stop; it releases the device before exiting
    pub fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .map_err(|_| EngineError::Disconnected)
    }
}

/// Event loop owning the transport
pub struct ControlLoop {
    transport: TransportController,
    monitor: RouteMonitor,
    commands: Receiver<Command>,
    session: Receiver<SessionEvent>,
}

impl ControlLoop {
    pub fn new(
        transport: TransportController,
        session: Receiver<SessionEvent>,
    ) -> (Self, ControlHandle) {
        let (commands_tx, commands_rx) = unbounded();
        let control = Self {
            transport,
            monitor: RouteMonitor::new(),
            commands: commands_rx,
            session,
        };
        (control, ControlHandle { commands: commands_tx })
    }

    /// Run on a dedicated thread; the join handle gives the transport back
    pub fn spawn(
        transport: TransportController,
        session: Receiver<SessionEvent>,
    ) -> Result<(ControlHandle, JoinHandle<TransportController>)> {
        let (control, handle) = Self::new(transport, session);
        let join = thread::Builder::new()
            .name("repitch-control".to_string())
            .spawn(move || control.run())?;
        Ok((handle, join))
    }

    /// Process messages until shutdown or until every handle is dropped
    pub fn run(self) -> TransportController {
        let ControlLoop {
            mut transport,
            monitor,
            commands,
            mut session,
        } = self;

        let mut session_closed = false;
        log::debug!("[CONTROL] Loop started");
        loop {
            let engine_events = transport.engine_events();
            let ticks = transport.progress_ticks();

            select! {
                recv(commands) -> command => match command {
                    Ok(Command::Shutdown) | Err(_) => break,
                    Ok(command) => Self::apply(&mut transport, &monitor, command),
                },
                recv(session) -> event => match event {
                    Ok(event) => {
                        if let Err(e) = monitor.dispatch(&event, &mut transport) {
                            log::warn!("[CONTROL] Session event {:?} failed: {}", event, e);
                        }
                    }
                    Err(_) => {
                        log::debug!("[CONTROL] Session source closed");
                        session_closed = true;
                    }
                },
                recv(engine_events) -> event => {
                    if let Ok(event) = event {
                        transport.handle_event(event);
                    }
                },
                recv(ticks) -> _ => {
                    transport.tick_progress();
                },
            }

            if session_closed {
                session = never();
                session_closed = false;
            }
        }

        transport.shutdown();
        log::debug!("[CONTROL] Loop stopped");
        transport
    }

    fn apply(transport: &mut TransportController, monitor: &RouteMonitor, command: Command) {
        // A dropped reply receiver means the caller gave up waiting
        match command {
            Command::Play(reply) => {
                let _ = reply.send(transport.request_play());
            }
            Command::Stop(reply) => {
                let _ = reply.send(transport.request_stop());
            }
            Command::TogglePlay(reply) => {
                let _ = reply.send(transport.toggle_play());
            }
            Command::Render(reply) => {
                let _ = reply.send(transport.request_render());
            }
            Command::SetPitch(cents, reply) => {
                transport.set_pitch(cents);
                let _ = reply.send(());
            }
            Command::Session(event, reply) => {
                let _ = reply.send(monitor.dispatch(&event, transport));
            }
            Command::Status(reply) => {
                transport.process_events();
                let _ = reply.send(transport.status().clone());
            }
            Command::Subscribe(reply) => {
                let _ = reply.send(transport.subscribe());
            }
            Command::Shutdown => {}
        }
    }
}
