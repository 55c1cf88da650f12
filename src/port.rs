//! Translation of DAP stepping requests into the Logtalk debugger port commands.

use crate::config::Settings;
use std::sync::{Arc, RwLock};

/// Stepping verbs supported by the editor.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StepVerb {
    Continue,
    StepOver,
    StepInto,
    StepOut,
}

impl StepVerb {
    /// Single character debugger command.
    ///
    /// The debugger has no step-out primitive, `skip` is the nearest one.
    pub fn command(self) -> char {
        match self {
            StepVerb::Continue => 'l',
            StepVerb::StepOver => 's',
            StepVerb::StepInto => 'c',
            StepVerb::StepOut => 's',
        }
    }
}

/// Terminator appended to every debugger command.
///
/// This is the single owner of the backend derived state, clones share the same value.
#[derive(Clone, Debug, Default)]
pub struct LineTerminator(Arc<RwLock<&'static str>>);

impl LineTerminator {
    pub fn from_settings(settings: &Settings) -> Self {
        let terminator = Self::default();
        terminator.apply_settings(settings);
        terminator
    }

    /// Recompute terminator, called on every configuration change.
    pub fn apply_settings(&self, settings: &Settings) {
        let new = if settings.backend.reads_whole_lines() {
            "\r"
        } else {
            ""
        };
        if let Ok(mut current) = self.0.write() {
            if *current != new {
                log::debug!(target: "dap", "debugger command terminator changed to {new:?}");
            }
            *current = new;
        }
    }

    pub fn get(&self) -> &'static str {
        self.0.read().map(|t| *t).unwrap_or_default()
    }
}

/// Maps stepping verbs to the terminal debugger vocabulary.
#[derive(Clone, Debug, Default)]
pub struct PortCommandTranslator {
    terminator: LineTerminator,
}

impl PortCommandTranslator {
    pub fn new(terminator: LineTerminator) -> Self {
        Self { terminator }
    }

    pub fn translate(&self, verb: StepVerb) -> String {
        let mut cmd = verb.command().to_string();
        cmd.push_str(self.terminator.get());
        cmd
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Backend;

    #[test]
    fn test_translate() {
        struct TestCase {
            backend: Backend,
            verb: StepVerb,
            expected: &'static str,
        }

        let cases = [
            TestCase {
                backend: Backend::Swi,
                verb: StepVerb::Continue,
                expected: "l",
            },
            TestCase {
                backend: Backend::Swi,
                verb: StepVerb::StepOver,
                expected: "s",
            },
            TestCase {
                backend: Backend::Swi,
                verb: StepVerb::StepInto,
                expected: "c",
            },
            TestCase {
                backend: Backend::Swi,
                verb: StepVerb::StepOut,
                expected: "s",
            },
            TestCase {
                backend: Backend::Eclipse,
                verb: StepVerb::Continue,
                expected: "l\r",
            },
            TestCase {
                backend: Backend::Xsb,
                verb: StepVerb::StepInto,
                expected: "c\r",
            },
        ];

        for tc in cases {
            let settings = Settings {
                backend: tc.backend,
                ..Settings::default()
            };
            let translator = PortCommandTranslator::new(LineTerminator::from_settings(&settings));
            assert_eq!(translator.translate(tc.verb), tc.expected);
        }
    }

    #[test]
    fn test_terminator_follows_configuration_change() {
        let terminator = LineTerminator::from_settings(&Settings::default());
        let translator = PortCommandTranslator::new(terminator.clone());
        assert_eq!(translator.translate(StepVerb::Continue), "l");

        terminator.apply_settings(&Settings {
            backend: Backend::Ciao,
            ..Settings::default()
        });
        assert_eq!(translator.translate(StepVerb::Continue), "l\r");

        terminator.apply_settings(&Settings::default());
        assert_eq!(translator.translate(StepVerb::Continue), "l");
    }
}
