use crate::error::Error;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Prolog system that runs Logtalk.
#[derive(
    Copy, Clone, PartialEq, Eq, Debug, Default, EnumString, EnumIter, Display, IntoStaticStr,
)]
pub enum Backend {
    #[strum(serialize = "b")]
    BProlog,
    #[strum(serialize = "ciao")]
    Ciao,
    #[strum(serialize = "cx")]
    CxProlog,
    #[strum(serialize = "eclipse")]
    Eclipse,
    #[strum(serialize = "gnu")]
    Gnu,
    #[strum(serialize = "ji")]
    JiProlog,
    #[strum(serialize = "sicstus")]
    Sicstus,
    #[default]
    #[strum(serialize = "swi")]
    Swi,
    #[strum(serialize = "tau")]
    Tau,
    #[strum(serialize = "trealla")]
    Trealla,
    #[strum(serialize = "xsb")]
    Xsb,
    #[strum(serialize = "xvm")]
    Xvm,
    #[strum(serialize = "yap")]
    Yap,
}

impl Backend {
    /// Name of the Logtalk integration script for this backend.
    pub fn script(self) -> &'static str {
        match self {
            Backend::BProlog => "bplgt",
            Backend::Ciao => "ciaolgt",
            Backend::CxProlog => "cxlgt",
            Backend::Eclipse => "eclipselgt",
            Backend::Gnu => "gplgt",
            Backend::JiProlog => "jiplgt",
            Backend::Sicstus => "sicstuslgt",
            Backend::Swi => "swilgt",
            Backend::Tau => "taulgt",
            Backend::Trealla => "tplgt",
            Backend::Xsb => "xsblgt",
            Backend::Xvm => "xvmlgt",
            Backend::Yap => "yaplgt",
        }
    }

    /// Return true if the backend reads debugger commands as whole lines, so every
    /// single character command must be terminated by a carriage return.
    pub fn reads_whole_lines(self) -> bool {
        matches!(
            self,
            Backend::BProlog | Backend::Ciao | Backend::CxProlog | Backend::Eclipse | Backend::Xsb
        )
    }
}

/// Adapter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Backend Prolog system, decides a debugger command terminator.
    pub backend: Backend,
    /// Explicit path to a Logtalk integration script, overrides backend default.
    pub logtalk_executable: Option<PathBuf>,
    /// Extra arguments for the integration script.
    pub logtalk_args: Vec<String>,
    /// Side-channel file written by the debugger on every stop.
    pub debug_info_file: PathBuf,
    /// Delay before a `stopped` event is assumed after a stepping command.
    pub stop_delay: Duration,
    /// Watchers poll interval.
    pub poll_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            logtalk_executable: None,
            logtalk_args: vec![],
            debug_info_file: PathBuf::from(Self::DEFAULT_DEBUG_INFO_FILE),
            stop_delay: Duration::from_millis(Self::DEFAULT_STOP_DELAY_MS),
            poll_interval: Duration::from_millis(Self::DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// On-disk representation of [`Settings`].
#[derive(Deserialize, Default, Debug)]
#[serde(default)]
struct SettingsConfig {
    backend: Option<String>,
    logtalk_executable: Option<PathBuf>,
    logtalk_args: Vec<String>,
    debug_info_file: Option<PathBuf>,
    stop_delay_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
}

impl Settings {
    const DEFAULT_PATH: &'static str = ".config/logtalk-dap/config.toml";
    const DEFAULT_DEBUG_INFO_FILE: &'static str = ".debug_info";
    const DEFAULT_STOP_DELAY_MS: u64 = 300;
    const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

    /// Default configuration file location (in user home directory).
    pub fn default_path() -> Option<PathBuf> {
        home::home_dir().map(|home| home.join(Self::DEFAULT_PATH))
    }

    /// Load settings from a file.
    ///
    /// If `path` is `None` the default location is used, a missing default file
    /// means default settings. An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load settings from a toml file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let data = read_to_string(path)?;
        Self::from_toml(&data).map_err(|e| match e {
            Error::Toml(_, e) => Error::Toml(path.to_path_buf(), e),
            e => e,
        })
    }

    /// Parse settings from toml text.
    pub fn from_toml(data: &str) -> Result<Self, Error> {
        let cfg: SettingsConfig =
            toml::de::from_str(data).map_err(|e| Error::Toml(PathBuf::new(), e))?;

        let default = Self::default();
        let backend = match cfg.backend {
            None => default.backend,
            Some(name) => Backend::from_str(&name).map_err(|_| Error::UnknownBackend(name))?,
        };

        Ok(Self {
            backend,
            logtalk_executable: cfg.logtalk_executable,
            logtalk_args: cfg.logtalk_args,
            debug_info_file: cfg.debug_info_file.unwrap_or(default.debug_info_file),
            stop_delay: cfg
                .stop_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(default.stop_delay),
            poll_interval: cfg
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(default.poll_interval),
        })
    }

    /// Resolve integration script path, looks into `PATH` if no explicit executable
    /// is configured.
    pub fn resolve_executable(&self) -> Result<PathBuf, Error> {
        match &self.logtalk_executable {
            Some(path) => Ok(path.clone()),
            None => {
                let script = self.backend.script();
                which::which(script).map_err(|_| Error::ExecutableNotFound(script.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use strum::IntoEnumIterator;

    #[test]
    fn test_backend_names() {
        for backend in Backend::iter() {
            let name: &'static str = backend.into();
            assert_eq!(Backend::from_str(name).unwrap(), backend);
        }
        assert!(Backend::from_str("swi-prolog").is_err());
    }

    #[test]
    fn test_settings_from_toml() {
        let settings = Settings::from_toml(
            r#"
            backend = "eclipse"
            logtalk_args = ["-q"]
            stop_delay_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(settings.backend, Backend::Eclipse);
        assert_eq!(settings.logtalk_args, vec!["-q".to_string()]);
        assert_eq!(settings.stop_delay, Duration::from_millis(50));
        assert_eq!(settings.debug_info_file, PathBuf::from(".debug_info"));
        assert_eq!(settings.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_settings_defaults_from_empty_file() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn test_settings_unknown_backend() {
        let err = Settings::from_toml(r#"backend = "nope""#).unwrap_err();
        assert!(matches!(err, Error::UnknownBackend(name) if name == "nope"));
    }

    #[test]
    fn test_explicit_executable_wins() {
        let settings = Settings {
            logtalk_executable: Some(PathBuf::from("/opt/logtalk/bin/swilgt")),
            ..Settings::default()
        };
        assert_eq!(
            settings.resolve_executable().unwrap(),
            PathBuf::from("/opt/logtalk/bin/swilgt")
        );
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_load_from_home_directory() {
        let home = std::env::temp_dir().join(format!("logtalk-dap-home-{}", std::process::id()));
        let dir = home.join(".config/logtalk-dap");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.toml"), "backend = \"xsb\"\n").unwrap();

        let old_home = std::env::var_os("HOME");
        std::env::set_var("HOME", &home);
        let settings = Settings::load(None);
        match old_home {
            Some(old_home) => std::env::set_var("HOME", old_home),
            None => std::env::remove_var("HOME"),
        }
        _ = fs::remove_dir_all(&home);

        assert_eq!(settings.unwrap().backend, Backend::Xsb);
    }

    #[test]
    fn test_explicit_missing_file() {
        let err = Settings::load(Some(Path::new("/nonexistent/logtalk-dap.toml"))).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
