mod environment;
mod settings;

pub use environment::InstallEnvironment;
pub use settings::{default_data_dir, LauncherSettings, SETTINGS_FILE};
