//! # Processing Session
//!
//! Owns the dedicated processing thread. Audio blocks arrive over a channel
//! from whatever acquires them (the cpal capture in [`crate::audio`], a file
//! reader, a test), are run through a [`PitchProcessor`], and every tick's
//! [`TickOutput`] is offered to a bounded output queue for the adapters.
//!
//! The worker blocks on its channels; there is no polling. Stopping sends a
//! shutdown command, joins the thread and takes the processor back, so the
//! calibration survives a stop/start cycle while the window and history are
//! cleared.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, error, info, warn};

use crate::audio::AudioEvent;
use crate::config::Config;
use crate::error::SessionError;
use crate::processor::{PitchProcessor, TickOutput};

/// Commands the owner sends to a running worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    RestartCalibration,
    Shutdown,
}

#[derive(Debug)]
struct Worker {
    command_tx: Sender<Command>,
    thread_handle: JoinHandle<PitchProcessor>,
}

pub struct Session {
    /// Parked here while stopped; moved into the worker while running.
    processor: Option<PitchProcessor>,
    worker: Option<Worker>,
    output_tx: Sender<TickOutput>,
    output_rx: Receiver<TickOutput>,
}

impl Session {
    /// Validates `config` and prepares a stopped session.
    pub fn new(config: Config) -> Result<Self, SessionError> {
        let (output_tx, output_rx) = crossbeam_channel::bounded(config.output_queue_capacity);
        let processor = PitchProcessor::new(config)?;
        Ok(Self {
            processor: Some(processor),
            worker: None,
            output_tx,
            output_rx,
        })
    }

    /// Receiver for per-tick outputs. Every clone shares the same queue.
    pub fn outputs(&self) -> Receiver<TickOutput> {
        self.output_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// The processor, available while the session is stopped.
    pub fn processor(&self) -> Option<&PitchProcessor> {
        self.processor.as_ref()
    }

    /// Spawns the worker consuming `audio_rx`.
    pub fn start(&mut self, audio_rx: Receiver<AudioEvent>) -> Result<(), SessionError> {
        if self.worker.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        let mut processor = self.processor.take().ok_or(SessionError::WorkerPanicked)?;
        let output_tx = self.output_tx.clone();
        let (command_tx, command_rx) = crossbeam_channel::bounded(4);

        info!(
            phase = ?processor.calibration().phase(),
            "Starting processing session"
        );
        let thread_handle = thread::spawn(move || {
            run_worker(&mut processor, &audio_rx, &command_rx, &output_tx);
            processor
        });

        self.worker = Some(Worker { command_tx, thread_handle });
        Ok(())
    }

    /// Shuts the worker down and waits for it to finish.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        let worker = self.worker.take().ok_or(SessionError::NotRunning)?;
        // The worker may already have exited on its own.
        let _ = worker.command_tx.send(Command::Shutdown);
        self.join(worker)
    }

    /// Waits for the worker to exit by itself, which happens once every
    /// sender of the audio channel is dropped.
    pub fn wait(&mut self) -> Result<(), SessionError> {
        let worker = self.worker.take().ok_or(SessionError::NotRunning)?;
        self.join(worker)
    }

    fn join(&mut self, worker: Worker) -> Result<(), SessionError> {
        let Worker { command_tx, thread_handle } = worker;
        let result = thread_handle.join();
        drop(command_tx);
        match result {
            Ok(mut processor) => {
                processor.reset();
                info!(ticks = processor.ticks(), "Processing session stopped");
                self.processor = Some(processor);
                Ok(())
            }
            Err(_) => {
                error!("Processing thread panicked");
                Err(SessionError::WorkerPanicked)
            }
        }
    }

    /// Throws away the learned bounds and measures again from the top note.
    pub fn restart_calibration(&mut self) -> Result<(), SessionError> {
        if let Some(worker) = &self.worker {
            return worker
                .command_tx
                .send(Command::RestartCalibration)
                .map_err(|_| SessionError::NotRunning);
        }
        match self.processor.as_mut() {
            Some(processor) => {
                processor.restart_calibration();
                Ok(())
            }
            None => Err(SessionError::WorkerPanicked),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                warn!("Session dropped while running: {}", e);
            }
        }
    }
}

fn run_worker(
    processor: &mut PitchProcessor,
    audio_rx: &Receiver<AudioEvent>,
    command_rx: &Receiver<Command>,
    output_tx: &Sender<TickOutput>,
) {
    let mut overflowed = 0_u64;
    loop {
        crossbeam_channel::select! {
            recv(audio_rx) -> msg => match msg {
                Ok(AudioEvent::Block(block)) => {
                    let Some(output) = processor.process_block(&block) else {
                        continue;
                    };
                    match output_tx.try_send(output) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            overflowed += 1;
                            // Log the first overflow and then every 100th.
                            if overflowed % 100 == 1 {
                                warn!(overflowed, "Output queue full, dropping ticks");
                            }
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                }
                Ok(AudioEvent::Fault(status)) => processor.skip_tick(&status),
                Err(_) => {
                    debug!("Audio channel closed");
                    break;
                }
            },
            recv(command_rx) -> msg => match msg {
                Ok(Command::RestartCalibration) => processor.restart_calibration(),
                Ok(Command::Shutdown) | Err(_) => {
                    debug!("Received shutdown signal");
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationPhase;
    use crate::mapper::ControlValue;

    #[test]
    fn test_invalid_config_fails_fast() {
        let config = Config { window_size: 0, ..Config::default() };
        assert!(matches!(Session::new(config), Err(SessionError::Config(_))));
    }

    #[test]
    fn test_silence_through_worker() {
        let mut session = Session::new(Config::default()).unwrap();
        let outputs = session.outputs();
        let (audio_tx, audio_rx) = crossbeam_channel::unbounded();
        session.start(audio_rx).unwrap();
        assert!(session.is_running());
        assert!(matches!(session.start(crossbeam_channel::never()), Err(SessionError::AlreadyRunning)));

        for _ in 0..3 {
            audio_tx.send(AudioEvent::Block(vec![0.0; 300])).unwrap();
        }
        drop(audio_tx);
        session.wait().unwrap();

        let ticks: Vec<TickOutput> = outputs.try_iter().collect();
        assert_eq!(ticks.len(), 3);
        assert!(ticks.iter().all(|t| t.control == ControlValue::Silence));
        assert!(!session.is_running());
        assert_eq!(session.processor().unwrap().ticks(), 3);
    }

    #[test]
    fn test_faults_produce_no_output() {
        let mut session = Session::new(Config::default()).unwrap();
        let outputs = session.outputs();
        let (audio_tx, audio_rx) = crossbeam_channel::unbounded();
        session.start(audio_rx).unwrap();
        audio_tx.send(AudioEvent::Fault("overflow".to_string())).unwrap();
        audio_tx.send(AudioEvent::Block(vec![0.0; 300])).unwrap();
        drop(audio_tx);
        session.wait().unwrap();

        assert_eq!(outputs.try_iter().count(), 1);
        assert_eq!(session.processor().unwrap().dropped_ticks(), 1);
    }

    #[test]
    fn test_stop_and_restart() {
        let mut session = Session::new(Config::default()).unwrap();
        assert!(matches!(session.stop(), Err(SessionError::NotRunning)));

        let (_audio_tx, audio_rx) = crossbeam_channel::unbounded::<AudioEvent>();
        session.start(audio_rx).unwrap();
        session.stop().unwrap();
        assert!(!session.is_running());

        let (_audio_tx, audio_rx) = crossbeam_channel::unbounded::<AudioEvent>();
        session.start(audio_rx).unwrap();
        session.restart_calibration().unwrap();
        session.stop().unwrap();
        assert_eq!(
            session.processor().unwrap().calibration().phase(),
            CalibrationPhase::MeasuringTop
        );
    }

    #[test]
    fn test_full_queue_drops_ticks() {
        let config = Config { output_queue_capacity: 2, ..Config::default() };
        let mut session = Session::new(config).unwrap();
        let outputs = session.outputs();
        let (audio_tx, audio_rx) = crossbeam_channel::unbounded();
        session.start(audio_rx).unwrap();
        for _ in 0..5 {
            audio_tx.send(AudioEvent::Block(vec![0.0; 300])).unwrap();
        }
        drop(audio_tx);
        session.wait().unwrap();

        assert_eq!(outputs.try_iter().count(), 2);
        assert_eq!(session.processor().unwrap().ticks(), 5);
    }
}
