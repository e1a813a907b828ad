use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const QUALIFIER: &str = "dev";
pub const ORGANIZATION: &str = "stap";

/// Path of a config or data file of the application. <br>
/// Falls back to the current directory when there is no home directory.
pub fn get_storage_file_path(
    application: &str, file_name: &str, file_kind: FileKind,
) -> Result<PathBuf, std::io::Error> {
    let dirs = ProjectDirs::from(QUALIFIER, ORGANIZATION, application);
    match dirs {
        None => {
            let mut current_dir = env::current_dir()?;
            current_dir.push(file_name);
            Ok(current_dir)
        },
        Some(value) => Ok(file_kind.into_path(&value).join(file_name)),
    }
}

/// Config path given as the first CLI argument, if any.
pub fn path_from_args() -> Option<PathBuf> {
    env::args_os().nth(1).map(PathBuf::from)
}

pub fn create_parent_directories(path: &Path) -> Result<(), std::io::Error> {
    if let Some(parent_path) = path.parent() {
        return fs::create_dir_all(parent_path);
    }

    Ok(())
}

pub enum FileKind {
    Data,
    Config,
}

impl FileKind {
    pub fn into_path(self, project_dirs: &ProjectDirs) -> &Path {
        match self {
            FileKind::Config => project_dirs.config_dir(),
            FileKind::Data => project_dirs.data_dir(),
        }
    }
}
