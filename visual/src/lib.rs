//! Default locations of the data and the outputs of the `visual` command line
//! tool, and its log levels. All defaults are relative to the working directory.

pub mod logging {
    use log::LevelFilter;

    /// Modules whose `info!` messages report progress: default paths,
    /// training epochs and written images.
    pub const PROGRESS_MODULES: &[&str] = &["visual", "ml::training", "edges"];

    /// Log level of the progress modules. They report at least at info
    /// level, more verbose levels are kept.
    pub fn progress_level(verbosity: LevelFilter) -> LevelFilter {
        verbosity.max(LevelFilter::Info)
    }

}

pub mod paths {
    use log::info;
    use std::path::{Path, PathBuf};

    pub const DATA_DIR: &str = "data";
    pub const OUT_DIR: &str = "out";

    pub const TARGET_IMAGE: &str = "We_Hold_These_Truths.jpg";
    pub const ROI_IMAGE: &str = "image_with_ROI.jpg";
    pub const CROPPED_IMAGE: &str = "image_cropped.jpg";
    pub const LETTERS_IMAGE: &str = "image_letters.jpg";

    pub const HISTORY_FILE: &str = "history.json";
    pub const WEIGHTS_FILE: &str = "cnn_weights.npz";

    pub fn training_dir() -> PathBuf {
        Path::new(DATA_DIR).join("assignment5").join("training")
    }

    pub fn validation_dir() -> PathBuf {
        Path::new(DATA_DIR).join("assignment5").join("validation")
    }

    pub fn edges_data_dir() -> PathBuf {
        Path::new(DATA_DIR).join("assignment3")
    }

    pub fn out_dir() -> PathBuf {
        PathBuf::from(OUT_DIR)
    }

    /// Returns the given path, or logs and returns the default.
    pub fn or_default<F>(given: &Option<PathBuf>, what: &str, default: F) -> PathBuf
    where
        F: FnOnce() -> PathBuf,
    {
        match given {
            Some(path) => path.clone(),
            None => {
                let path = default();
                info!("{} is not specified. Setting it to '{}'.", what, path.display());
                path
            }
        }
    }

}
