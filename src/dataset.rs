//! Access to an extracted copy of the ASPset-510 dataset on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::camera::Camera;
use crate::error::{Aspset510Error, Result};
use crate::mocap::{load_mocap, Mocap};

/// Handle to an ASPset-510 data directory.
///
/// The directory is expected to contain `splits.csv` along with the
/// `trainval/` and `test/` partition trees produced by archive extraction.
#[derive(Debug)]
pub struct Aspset510 {
    data_dir: PathBuf,
    // split name -> (subject_id, clip_id) pairs, in splits.csv order.
    splits: BTreeMap<String, Vec<(String, String)>>,
}

impl Aspset510 {
    /// Camera identifiers, in left-to-right viewing order.
    pub const CAMERA_IDS: [&'static str; 3] = ["left", "mid", "right"];

    /// Open a dataset directory, reading the clip split assignments from
    /// `splits.csv`.
    ///
    /// # Errors
    /// Returns an error if `splits.csv` is missing or malformed.
    pub fn from_data_dir(data_dir: &Path) -> Result<Self> {
        let splits_path = data_dir.join("splits.csv");
        let contents = fs::read_to_string(&splits_path)
            .map_err(|e| Aspset510Error::file_io_error("read splits file", &splits_path, &e))?;
        let mut splits: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let [subject_id, clip_id, split] = fields.as_slice() else {
                return Err(Aspset510Error::dataset(format!(
                    "malformed row {} in '{}': expected subject_id,clip_id,split",
                    line_no + 1,
                    splits_path.display()
                )));
            };
            splits
                .entry((*split).to_string())
                .or_default()
                .push(((*subject_id).to_string(), (*clip_id).to_string()));
        }
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            splits,
        })
    }

    /// Root of the dataset directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Names of the splits defined in `splits.csv`.
    #[must_use]
    pub fn split_names(&self) -> Vec<&str> {
        self.splits.keys().map(String::as_str).collect()
    }

    /// Find which split a clip belongs to.
    ///
    /// # Errors
    /// Returns an error if the clip is not listed in `splits.csv`.
    pub fn find_split(&self, subject_id: &str, clip_id: &str) -> Result<&str> {
        for (split, clips) in &self.splits {
            if clips.iter().any(|(s, c)| s == subject_id && c == clip_id) {
                return Ok(split);
            }
        }
        Err(Aspset510Error::dataset(format!(
            "clip {subject_id}-{clip_id} is not listed in splits.csv"
        )))
    }

    /// Handle to a single clip.
    #[must_use]
    pub fn clip(&self, subject_id: &str, clip_id: &str) -> Clip<'_> {
        Clip {
            aspset: self,
            subject_id: subject_id.to_string(),
            clip_id: clip_id.to_string(),
        }
    }

    /// Clips belonging to a split. In addition to the splits defined in
    /// `splits.csv`, the names `trainval` (train plus val) and `all` are
    /// accepted.
    ///
    /// # Errors
    /// Returns an error for unknown split names.
    pub fn split_clips(&self, split: &str) -> Result<Vec<Clip<'_>>> {
        match split {
            "trainval" => {
                let mut clips = self.split_clips("train")?;
                clips.extend(self.split_clips("val")?);
                Ok(clips)
            },
            "all" => {
                let mut clips = self.split_clips("trainval")?;
                clips.extend(self.split_clips("test")?);
                Ok(clips)
            },
            name => {
                let clips = self.splits.get(name).ok_or_else(|| {
                    Aspset510Error::dataset(format!(
                        "unknown split '{name}' (known splits: {})",
                        self.split_names().join(", ")
                    ))
                })?;
                Ok(clips
                    .iter()
                    .map(|(subject_id, clip_id)| self.clip(subject_id, clip_id))
                    .collect())
            },
        }
    }

    /// Clips in the `train` split.
    pub fn train_clips(&self) -> Result<Vec<Clip<'_>>> {
        self.split_clips("train")
    }

    /// Clips in the `val` split.
    pub fn val_clips(&self) -> Result<Vec<Clip<'_>>> {
        self.split_clips("val")
    }

    /// Clips in the `train` and `val` splits.
    pub fn trainval_clips(&self) -> Result<Vec<Clip<'_>>> {
        self.split_clips("trainval")
    }

    /// Clips in the `test` split.
    pub fn test_clips(&self) -> Result<Vec<Clip<'_>>> {
        self.split_clips("test")
    }

    /// Every clip in the dataset.
    pub fn all_clips(&self) -> Result<Vec<Clip<'_>>> {
        self.split_clips("all")
    }

    fn ensure_camera_id(camera_id: &str) -> Result<()> {
        if Self::CAMERA_IDS.contains(&camera_id) {
            return Ok(());
        }
        Err(Aspset510Error::dataset(format!(
            "unknown camera '{camera_id}' (cameras: {})",
            Self::CAMERA_IDS.join(", ")
        )))
    }
}

/// A single recorded clip: one subject performing one action, captured by
/// three cameras with 3D joint annotations.
#[derive(Debug, Clone)]
pub struct Clip<'a> {
    aspset: &'a Aspset510,
    subject_id: String,
    clip_id: String,
}

impl Clip<'_> {
    /// Subject identifier (e.g. `04ac`).
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Clip identifier within the subject (e.g. `0026`).
    #[must_use]
    pub fn clip_id(&self) -> &str {
        &self.clip_id
    }

    /// The split this clip belongs to.
    pub fn split(&self) -> Result<&str> {
        self.aspset.find_split(&self.subject_id, &self.clip_id)
    }

    // Files for test clips live under test/, everything else under trainval/.
    fn partition_dir(&self) -> Result<PathBuf> {
        let partition = if self.split()? == "test" { "test" } else { "trainval" };
        Ok(self.aspset.data_dir.join(partition))
    }

    /// Path of the clip's 3D joint annotation file.
    pub fn mocap_path(&self) -> Result<PathBuf> {
        Ok(self
            .partition_dir()?
            .join("joints_3d")
            .join(&self.subject_id)
            .join(format!("{}-{}.c3d", self.subject_id, self.clip_id)))
    }

    /// Load the clip's 3D joint annotations.
    pub fn load_mocap(&self) -> Result<Mocap> {
        load_mocap(&self.mocap_path()?)
    }

    /// Path of the clip's video for one camera.
    pub fn video_path(&self, camera_id: &str) -> Result<PathBuf> {
        Aspset510::ensure_camera_id(camera_id)?;
        Ok(self
            .partition_dir()?
            .join("videos")
            .join(&self.subject_id)
            .join(format!("{}-{}-{}.mkv", self.subject_id, self.clip_id, camera_id)))
    }

    /// Path of the subject's camera calibration file for one camera.
    pub fn camera_path(&self, camera_id: &str) -> Result<PathBuf> {
        Aspset510::ensure_camera_id(camera_id)?;
        Ok(self
            .partition_dir()?
            .join("cameras")
            .join(&self.subject_id)
            .join(format!("{}-{}.json", self.subject_id, camera_id)))
    }

    /// Load the calibrated camera for one viewpoint.
    pub fn load_camera(&self, camera_id: &str) -> Result<Camera> {
        Camera::load(&self.camera_path(camera_id)?)
    }

    /// Number of annotated frames in the clip.
    pub fn frame_count(&self) -> Result<usize> {
        Ok(self.load_mocap()?.frame_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocap::{save_mocap, Mocap};
    use ndarray::Array3;
    use std::fs;

    fn fixture_dataset() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("splits.csv"),
            "04ac,0026,train\n04ac,0031,val\n8a59,0035,test\n",
        )
        .unwrap();
        let joints_dir = dir.path().join("trainval").join("joints_3d").join("04ac");
        fs::create_dir_all(&joints_dir).unwrap();
        let mocap = Mocap::new(Array3::zeros((12, 17, 3)), "aspset_17j", 50.0).unwrap();
        save_mocap(&mocap, &joints_dir.join("04ac-0026.c3d")).unwrap();
        dir
    }

    #[test]
    fn test_split_clips() {
        let dir = fixture_dataset();
        let aspset = Aspset510::from_data_dir(dir.path()).unwrap();
        assert_eq!(aspset.split_names(), vec!["test", "train", "val"]);
        assert_eq!(aspset.train_clips().unwrap().len(), 1);
        assert_eq!(aspset.trainval_clips().unwrap().len(), 2);
        assert_eq!(aspset.all_clips().unwrap().len(), 3);
        assert!(aspset.split_clips("validation").is_err());
    }

    #[test]
    fn test_find_split() {
        let dir = fixture_dataset();
        let aspset = Aspset510::from_data_dir(dir.path()).unwrap();
        assert_eq!(aspset.find_split("8a59", "0035").unwrap(), "test");
        assert!(aspset.find_split("ffff", "0000").is_err());
    }

    #[test]
    fn test_clip_paths() {
        let dir = fixture_dataset();
        let aspset = Aspset510::from_data_dir(dir.path()).unwrap();

        let clip = aspset.clip("04ac", "0026");
        assert!(clip
            .video_path("left")
            .unwrap()
            .ends_with("trainval/videos/04ac/04ac-0026-left.mkv"));
        assert!(clip
            .camera_path("mid")
            .unwrap()
            .ends_with("trainval/cameras/04ac/04ac-mid.json"));

        // Test clips resolve under the test partition.
        let clip = aspset.clip("8a59", "0035");
        assert!(clip
            .mocap_path()
            .unwrap()
            .ends_with("test/joints_3d/8a59/8a59-0035.c3d"));

        assert!(clip.video_path("overhead").is_err());
    }

    #[test]
    fn test_clip_frame_count() {
        let dir = fixture_dataset();
        let aspset = Aspset510::from_data_dir(dir.path()).unwrap();
        assert_eq!(aspset.clip("04ac", "0026").frame_count().unwrap(), 12);
    }

    #[test]
    fn test_malformed_splits_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("splits.csv"), "04ac,0026\n").unwrap();
        assert!(Aspset510::from_data_dir(dir.path()).is_err());
    }
}
