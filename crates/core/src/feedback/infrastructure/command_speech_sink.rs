use std::process::{Child, Command, Stdio};

use crate::feedback::domain::feedback_event::{HapticPattern, Priority};
use crate::feedback::domain::feedback_sink::{FeedbackSink, SinkError};

/// Speaks through an external text-to-speech program such as `espeak` or
/// `say`, passing the text as the last argument.
///
/// The program runs detached; the sink is busy until it exits. An
/// interrupting announcement kills the running utterance first.
pub struct CommandSpeechSink {
    program: String,
    args: Vec<String>,
    current: Option<Child>,
}

impl CommandSpeechSink {
    /// Parses a command line like `"espeak -s 170"`.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            current: None,
        })
    }

    fn is_speaking(&mut self) -> bool {
        match self.current.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(_)) | Err(_) => {
                    self.current = None;
                    false
                }
            },
            None => false,
        }
    }

    fn stop_current(&mut self) {
        if let Some(mut child) = self.current.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl FeedbackSink for CommandSpeechSink {
    fn announce(&mut self, text: &str, _priority: Priority, interrupt: bool) -> Result<(), SinkError> {
        if self.is_speaking() {
            if !interrupt {
                return Err(SinkError::Busy);
            }
            self.stop_current();
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SinkError::Failed(format!("{}: {e}", self.program)))?;
        self.current = Some(child);
        Ok(())
    }

    fn vibrate(&mut self, pattern: HapticPattern) -> Result<(), SinkError> {
        log::trace!("No haptic device; skipping {pattern:?}");
        Ok(())
    }
}

impl Drop for CommandSpeechSink {
    fn drop(&mut self) {
        self.stop_current();
    }
}
