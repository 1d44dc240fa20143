//! Console progress reporting for running probes

use crate::probe::{ProbePhase, ProgressObserver};
use crate::types::ProbeKind;
use colored::*;

/// Prints probe phases, progress and warnings to stderr.
///
/// Results go to stdout, so progress never mixes into piped output.
#[derive(Debug, Clone)]
pub struct ConsoleProgress {
    use_color: bool,
    show_phases: bool,
}

impl ConsoleProgress {
    pub fn new(use_color: bool, show_phases: bool) -> Self {
        Self { use_color, show_phases }
    }

    fn tag(&self, kind: ProbeKind) -> String {
        let tag = format!("[{}]", kind.label());
        if self.use_color {
            tag.cyan().to_string()
        } else {
            tag
        }
    }

    pub(crate) fn progress_line(&self, kind: ProbeKind, collected: usize, target: Option<usize>) -> String {
        match target {
            Some(target) if target > 0 => format!(
                "{} {}/{} samples ({:.0}%)",
                self.tag(kind),
                collected,
                target,
                collected as f64 / target as f64 * 100.0
            ),
            _ => format!("{} {} samples", self.tag(kind), collected),
        }
    }

    pub(crate) fn warning_line(&self, kind: ProbeKind, message: &str) -> String {
        let text = format!("warning: {}", message);
        let text = if self.use_color { text.yellow().to_string() } else { text };
        format!("{} {}", self.tag(kind), text)
    }
}

impl ProgressObserver for ConsoleProgress {
    fn on_phase(&self, kind: ProbeKind, phase: ProbePhase) {
        if self.show_phases {
            eprintln!("{} {}", self.tag(kind), phase.as_str());
        }
    }

    fn on_progress(&self, kind: ProbeKind, collected: usize, target: Option<usize>) {
        eprintln!("{}", self.progress_line(kind, collected, target));
    }

    fn on_warning(&self, kind: ProbeKind, message: &str) {
        eprintln!("{}", self.warning_line(kind, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line() {
        let progress = ConsoleProgress::new(false, true);
        assert_eq!(
            progress.progress_line(ProbeKind::WsPingPong, 50, Some(100)),
            "[WebSocket ping/pong] 50/100 samples (50%)"
        );
        assert_eq!(
            progress.progress_line(ProbeKind::StreamEvent, 500, None),
            "[Stream event] 500 samples"
        );
    }

    #[test]
    fn test_warning_line() {
        let progress = ConsoleProgress::new(false, false);
        assert_eq!(
            progress.warning_line(ProbeKind::TcpConnect, "3 of 20 connects failed"),
            "[TCP connect] warning: 3 of 20 connects failed"
        );
    }
}
