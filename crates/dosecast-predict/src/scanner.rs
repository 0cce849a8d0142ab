//! Artifact directory scanner.
//!
//! Lists `<output_root>/<patient>-images/<category>/*.<ext>` and maps every
//! file to its public URL. Slices are ordered by the last run of digits in the
//! file stem, so `slice_10` follows `slice_9`.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;

use dosecast_config::ArtifactLayout;

use crate::error::{PredictionError, PredictionResult};
use crate::model::{Artifact, ArtifactCategory, ArtifactSet, PatientKey};

/// URL prefix under which the output root is served.
pub const PUBLIC_PREFIX: &str = "/predictions";

/// Reads artifact directories for a given layout.
#[derive(Debug, Clone)]
pub struct ArtifactScanner {
    layout: ArtifactLayout,
}

impl ArtifactScanner {
    /// Scanner over `layout`.
    #[must_use]
    pub const fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    /// Scan every category for `patient`.
    ///
    /// Missing directories yield empty categories. The caller decides whether an
    /// entirely empty set is an error.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError::Io`] when a present directory cannot be read.
    pub fn scan(&self, patient: &PatientKey) -> PredictionResult<ArtifactSet> {
        let patient_dir = self.layout.output_dir(patient.as_str());
        let mut set = ArtifactSet::default();
        for category in ArtifactCategory::ALL {
            let dir = patient_dir.join(category.as_str());
            *set.category_mut(category) = self.scan_category(&dir, patient, category)?;
        }
        Ok(set)
    }

    fn scan_category(
        &self,
        dir: &Path,
        patient: &PatientKey,
        category: ArtifactCategory,
    ) -> PredictionResult<Vec<Artifact>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(PredictionError::io("scan.read_dir", dir, err)),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| PredictionError::io("scan.entry", dir, err))?;
            let file_type = entry
                .file_type()
                .map_err(|err| PredictionError::io("scan.file_type", entry.path(), err))?;
            if !file_type.is_file() {
                continue;
            }
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if !self.has_image_extension(&file_name) {
                continue;
            }
            let slice = slice_number(stem(&file_name));
            let url = artifact_url(&self.layout.public_base_url, patient, category, &file_name);
            artifacts.push(Artifact {
                category,
                file_name,
                slice,
                url,
            });
        }
        artifacts.sort_by(compare_artifacts);
        Ok(artifacts)
    }

    fn has_image_extension(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.layout.image_extension))
    }
}

/// Public URL of one artifact file.
#[must_use]
pub fn artifact_url(
    base: &str,
    patient: &PatientKey,
    category: ArtifactCategory,
    file_name: &str,
) -> String {
    format!(
        "{base}{PUBLIC_PREFIX}/{dir}/{category}/{file_name}",
        dir = ArtifactLayout::output_dir_name(patient.as_str()),
    )
}

/// Value of the last run of ASCII digits in `stem`, if any.
#[must_use]
pub fn slice_number(stem: &str) -> Option<u64> {
    let end = stem.rfind(|ch: char| ch.is_ascii_digit())? + 1;
    let head = &stem[..end];
    let start = head.trim_end_matches(|ch: char| ch.is_ascii_digit()).len();
    head[start..].parse().ok()
}

fn stem(file_name: &str) -> &str {
    file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem)
}

fn compare_artifacts(left: &Artifact, right: &Artifact) -> Ordering {
    match (left.slice, right.slice) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| left.file_name.cmp(&right.file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn layout(root: &Path, base: &str) -> ArtifactLayout {
        ArtifactLayout {
            input_root: root.join("inputs"),
            output_root: root.join("predictions"),
            public_base_url: base.to_string(),
            image_extension: "png".to_string(),
        }
    }

    fn touch(dir: &Path, names: &[&str]) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        for name in names {
            fs::write(dir.join(name), b"\x89PNG")?;
        }
        Ok(())
    }

    #[test]
    fn ten_ct_slices_are_listed_in_numeric_order() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let layout = layout(root.path(), "http://localhost:5000");
        let ct_dir: PathBuf = layout.output_dir("pt1").join("ct");
        // Written out of order and without zero padding.
        let names: Vec<String> = [7, 2, 10, 1, 9, 3, 5, 8, 4, 6]
            .iter()
            .map(|idx| format!("ct_slice_{idx}.png"))
            .collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        touch(&ct_dir, &refs)?;

        let patient = PatientKey::parse("pt1")?;
        let set = ArtifactScanner::new(layout).scan(&patient)?;

        assert_eq!(set.ct.len(), 10);
        assert!(set.dose.is_empty());
        assert!(set.prediction.is_empty());
        let slices: Vec<_> = set.ct.iter().filter_map(|artifact| artifact.slice).collect();
        assert_eq!(slices, (1..=10).collect::<Vec<u64>>());
        assert_eq!(
            set.ct[0].url,
            "http://localhost:5000/predictions/pt1-images/ct/ct_slice_1.png"
        );
        assert_eq!(
            set.ct[9].url,
            "http://localhost:5000/predictions/pt1-images/ct/ct_slice_10.png"
        );
        Ok(())
    }

    #[test]
    fn missing_patient_directory_is_empty_not_an_error() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let set = ArtifactScanner::new(layout(root.path(), "")).scan(&PatientKey::parse("nobody")?)?;
        assert!(set.is_empty());
        Ok(())
    }

    #[test]
    fn non_images_and_subdirectories_are_skipped() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let layout = layout(root.path(), "");
        let dose_dir = layout.output_dir("pt2").join("dose");
        touch(&dose_dir, &["dose_1.PNG", "notes.txt", "dose_2.png.tmp"])?;
        fs::create_dir_all(dose_dir.join("nested.png"))?;

        let set = ArtifactScanner::new(layout).scan(&PatientKey::parse("pt2")?)?;
        let names: Vec<_> = set.dose.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, ["dose_1.PNG"]);
        assert_eq!(set.dose[0].url, "/predictions/pt2-images/dose/dose_1.PNG");
        Ok(())
    }

    #[test]
    fn unnumbered_files_sort_after_numbered_ones() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let layout = layout(root.path(), "");
        touch(
            &layout.output_dir("pt3").join("prediction"),
            &["overview.png", "pred_02.png", "legend.png", "pred_1.png", "pred_002.png"],
        )?;
        let set = ArtifactScanner::new(layout).scan(&PatientKey::parse("pt3")?)?;
        let names: Vec<_> = set.prediction.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(
            names,
            ["pred_1.png", "pred_002.png", "pred_02.png", "legend.png", "overview.png"]
        );
        Ok(())
    }

    #[test]
    fn slice_number_uses_last_digit_run() {
        assert_eq!(slice_number("ct_slice_010"), Some(10));
        assert_eq!(slice_number("p3_slice_12"), Some(12));
        assert_eq!(slice_number("42"), Some(42));
        assert_eq!(slice_number("coupe_é3"), Some(3));
        assert_eq!(slice_number("slice_7a"), Some(7));
        assert_eq!(slice_number("overview"), None);
    }
}
