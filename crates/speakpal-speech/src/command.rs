//! Speech device backed by a system text-to-speech program.
//!
//! Uses `say` on macOS and `espeak-ng`/`espeak` elsewhere. Each utterance is
//! one child process: cancelling kills it, a natural exit fires the
//! completion callback.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use speakpal_core::error::SpeakPalError;
use tokio::process::Child;
use uuid::Uuid;

use crate::device::{CompletionFn, DeliveryParams, SpeechDevice, Utterance};

/// Words per minute both `say` and `espeak` use at rate 1.0.
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Supported text-to-speech programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Say,
    Espeak,
}

/// A resolved text-to-speech executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechProgram {
    pub kind: ProgramKind,
    pub path: PathBuf,
}

impl SpeechProgram {
    /// Command-line arguments for speaking `utterance`.
    pub fn args(&self, utterance: &Utterance, voice: Option<&str>) -> Vec<String> {
        build_args(self.kind, &utterance.text, &utterance.params, voice)
    }
}

/// Map delivery parameters onto program arguments.
///
/// `say` only exposes rate and voice; `espeak` also takes pitch (0-99,
/// default 50) and amplitude (0-200, default 100).
pub fn build_args(
    kind: ProgramKind,
    text: &str,
    params: &DeliveryParams,
    voice: Option<&str>,
) -> Vec<String> {
    let wpm = (BASE_WORDS_PER_MINUTE * params.rate).round().max(1.0) as u32;
    let mut args = Vec::new();
    match kind {
        ProgramKind::Say => {
            args.push("-r".to_string());
            args.push(wpm.to_string());
        }
        ProgramKind::Espeak => {
            let pitch = (params.pitch * 50.0).round().clamp(0.0, 99.0) as u32;
            let amplitude = (params.volume * 100.0).round().clamp(0.0, 200.0) as u32;
            args.push("-s".to_string());
            args.push(wpm.to_string());
            args.push("-p".to_string());
            args.push(pitch.to_string());
            args.push("-a".to_string());
            args.push(amplitude.to_string());
        }
    }
    if let Some(v) = voice {
        args.push("-v".to_string());
        args.push(v.to_string());
    }
    // Keep text that starts with '-' from being read as a flag.
    if text.starts_with('-') {
        args.push(format!(" {}", text));
    } else {
        args.push(text.to_string());
    }
    args
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Locate a program for the configured engine name.
///
/// `"auto"` prefers `say`, then `espeak-ng`, then `espeak`.
pub fn detect_program(engine: &str) -> Option<SpeechProgram> {
    let candidates: &[(&str, ProgramKind)] = match engine {
        "say" => &[("say", ProgramKind::Say)],
        "espeak" => &[
            ("espeak-ng", ProgramKind::Espeak),
            ("espeak", ProgramKind::Espeak),
        ],
        "auto" => &[
            ("say", ProgramKind::Say),
            ("espeak-ng", ProgramKind::Espeak),
            ("espeak", ProgramKind::Espeak),
        ],
        _ => &[],
    };
    candidates.iter().find_map(|(name, kind)| {
        find_in_path(name).map(|path| SpeechProgram { kind: *kind, path })
    })
}

/// How often the exit watcher checks whether the child has finished.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The child process speaking the active utterance.
#[derive(Debug)]
struct Running {
    utterance_id: Uuid,
    child: Child,
}

impl Running {
    fn kill(mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(utterance_id = %self.utterance_id, error = %e, "Speech program already gone");
        }
    }
}

/// Device that runs one text-to-speech child process per utterance.
///
/// Must be used from within a tokio runtime. `cancel` kills the child before
/// returning; a watcher task only observes natural exits.
#[derive(Debug)]
pub struct CommandSpeechDevice {
    program: Option<SpeechProgram>,
    voice: Option<String>,
    current: Arc<Mutex<Option<Running>>>,
}

impl CommandSpeechDevice {
    /// Create a device for a known program.
    pub fn new(program: SpeechProgram, voice: Option<String>) -> Self {
        Self {
            program: Some(program),
            voice,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Search `PATH` for the configured engine. The device is unavailable
    /// when nothing suitable is installed or the engine is `"none"`.
    pub fn detect(engine: &str, voice: Option<String>) -> Self {
        let program = detect_program(engine);
        match &program {
            Some(p) => tracing::info!(program = %p.path.display(), "Speech program found"),
            None => tracing::warn!(engine, "No speech program found, replies will not be spoken"),
        }
        Self {
            program,
            voice,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn program(&self) -> Option<&SpeechProgram> {
        self.program.as_ref()
    }

    /// Whether a child process is currently speaking.
    pub fn is_speaking(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Wait for `utterance_id`'s child to exit on its own, then fire `on_end`.
///
/// Gives up silently once the child was cancelled or superseded.
async fn watch_exit(
    current: Arc<Mutex<Option<Running>>>,
    utterance_id: Uuid,
    on_end: CompletionFn,
) {
    let mut tick = tokio::time::interval(EXIT_POLL_INTERVAL);
    loop {
        tick.tick().await;
        let status = {
            let mut guard = current.lock().unwrap_or_else(PoisonError::into_inner);
            let running = match guard.as_mut() {
                Some(r) if r.utterance_id == utterance_id => r,
                _ => return,
            };
            match running.child.try_wait() {
                Ok(None) => continue,
                Ok(Some(status)) => {
                    guard.take();
                    Ok(status)
                }
                Err(e) => {
                    guard.take();
                    Err(e)
                }
            }
        };

        match status {
            Ok(status) if !status.success() => {
                tracing::debug!(utterance_id = %utterance_id, %status, "Speech program exited with failure");
            }
            Err(e) => {
                tracing::warn!(utterance_id = %utterance_id, error = %e, "Failed to wait for speech program");
            }
            Ok(_) => {}
        }
        on_end();
        return;
    }
}

impl SpeechDevice for CommandSpeechDevice {
    fn is_available(&self) -> bool {
        self.program.is_some()
    }

    fn speak(&self, utterance: &Utterance, on_end: CompletionFn) -> Result<(), SpeakPalError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| SpeakPalError::Speech("no speech program available".to_string()))?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| SpeakPalError::Speech(format!("no async runtime: {}", e)))?;

        let child = {
            let _runtime = handle.enter();
            tokio::process::Command::new(&program.path)
                .args(program.args(utterance, self.voice.as_deref()))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()?
        };

        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Running {
                utterance_id: utterance.id,
                child,
            });
        if let Some(previous) = previous {
            previous.kill();
        }

        handle.spawn(watch_exit(Arc::clone(&self.current), utterance.id, on_end));
        Ok(())
    }

    fn cancel(&self) {
        let running = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.kill();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
