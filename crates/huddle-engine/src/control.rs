//! Command loop driving the facade from the settings UI.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, instrument, warn};

use huddle_ipc::{AudioCommand, AudioEvent};

use crate::error::EngineResult;
use crate::facade::AudioFacade;

/// Drains [`AudioCommand`]s and applies them to the facade.
///
/// Responses and failures are published as [`AudioEvent`]s to every event
/// subscriber of the facade.
pub struct ControlLoop {
    facade: Arc<AudioFacade>,
    command_rx: Receiver<AudioCommand>,
}

impl ControlLoop {
    /// Create a control loop.
    pub fn new(facade: Arc<AudioFacade>, command_rx: Receiver<AudioCommand>) -> Self {
        Self { facade, command_rx }
    }

    /// Run the loop (blocking) until `Shutdown` or the channel disconnects.
    #[instrument(name = "control_run", skip(self))]
    pub fn run(&mut self) {
        info!("Control loop starting");

        loop {
            match self.command_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Command channel disconnected, shutting down");
                    break;
                }
            }
        }

        info!("Control loop stopped");
    }

    /// Handle a command. Returns false if the loop should stop.
    pub fn handle_command(&mut self, command: AudioCommand) -> bool {
        debug!(?command, "Handling command");

        let result = match command {
            AudioCommand::SubscribeInput => self.facade.subscribe_input(),
            AudioCommand::UnsubscribeInput => {
                self.facade.unsubscribe_input();
                Ok(())
            }
            AudioCommand::SetInputGain(db) => {
                self.facade.set_input_gain(db);
                Ok(())
            }
            AudioCommand::SetInputThreshold(threshold) => {
                self.facade.set_input_threshold(threshold);
                Ok(())
            }
            AudioCommand::SetVoiceHold(ms) => {
                self.facade.set_voice_hold(ms);
                Ok(())
            }
            AudioCommand::SetOutputVolume(volume) => {
                self.facade.set_output_volume(volume);
                Ok(())
            }
            AudioCommand::SetInputEnabled(enabled) => self.facade.set_input_enabled(enabled),
            AudioCommand::SetOutputEnabled(enabled) => self.facade.set_output_enabled(enabled),
            AudioCommand::ReinitInput(name) => self.facade.reinit_input(&name),
            AudioCommand::ReinitOutput(name) => self.facade.reinit_output(&name),
            AudioCommand::PlayOneShot(pcm) => self.facade.play_one_shot(pcm),
            AudioCommand::StopActive => {
                self.facade.stop_active();
                Ok(())
            }
            AudioCommand::GetDevices => {
                self.send_devices();
                Ok(())
            }
            AudioCommand::GetMetrics => {
                self.facade.emit(AudioEvent::Metrics(self.facade.metrics()));
                Ok(())
            }
            AudioCommand::Shutdown => return false,
        };

        self.report(result);
        true
    }

    fn send_devices(&self) {
        self.facade.emit(AudioEvent::Devices {
            inputs: self.facade.input_devices(),
            outputs: self.facade.output_devices(),
        });
    }

    fn report(&self, result: EngineResult<()>) {
        if let Err(e) = result {
            warn!("Command failed: {}", e);
            self.facade.emit(AudioEvent::Error {
                kind: None,
                message: e.to_string(),
            });
        }
    }
}
