//! Grouping of time slices belonging to the same simulation

use crate::errors::Result;
use crate::filename::Cmip5FileName;
use crate::nested::NestedMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Files indexed by variable / MIP table / model / experiment / ensemble
pub type FileIndex = NestedMap<String, Vec<PathBuf>>;

/// Sorted `*.nc` files directly inside `dir`
pub fn netcdf_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "nc") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Identify the files in `dir` that belong to the same simulation and
/// variable, and could therefore be concatenated along time.
///
/// Time-invariant (`fx`) files, climatologies, names without a period and
/// names that are not CMIP5 file names are left out. Each leaf lists its files in path order, which is
/// chronological for CMIP5 names.
pub fn cluster_time_slices(dir: &Path) -> Result<FileIndex> {
    let mut index = FileIndex::new();

    for path in netcdf_files(dir)? {
        let name = match Cmip5FileName::parse(&path) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(file = %path.display(), "skipping: {}", e);
                continue;
            }
        };
        if name.is_fixed() {
            tracing::debug!(file = %path.display(), "skipping time-invariant field");
            continue;
        }
        match &name.period {
            None => {
                tracing::warn!(file = %path.display(), "skipping: time slice without a period");
                continue;
            }
            Some(period) if period.is_climatology() => {
                tracing::debug!(file = %path.display(), "skipping climatology");
                continue;
            }
            Some(_) => {}
        }

        let key = name.simulation_key();
        match index.get_leaf_mut(&key) {
            Some(files) => files.push(path),
            None => index.set(&key, vec![path])?,
        }
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nested::Subset;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn groups_by_simulation_and_skips_fixed_fields() {
        let dir = tempdir().unwrap();
        for name in [
            "tas_Amon_CCSM4_rcp85_r1i1p1_205101-210012.nc",
            "tas_Amon_CCSM4_rcp85_r1i1p1_200601-205012.nc",
            "tas_Amon_CCSM4_rcp85_r2i1p1_200601-210012.nc",
            "pr_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc",
            "orog_fx_CCSM4_rcp85_r0i0p0.nc",
            "README.nc",
            "notes.txt",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let index = cluster_time_slices(dir.path()).unwrap();
        assert_eq!(index.size(), 3);
        assert_eq!(index.depth(), 5);

        let key: Vec<String> = ["tas", "Amon", "CCSM4", "rcp85", "r1i1p1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let files = index.get_leaf(&key).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "tas_Amon_CCSM4_rcp85_r1i1p1_200601-205012.nc",
                "tas_Amon_CCSM4_rcp85_r1i1p1_205101-210012.nc",
            ]
        );

        assert!(!index.keys_at_level(1).contains("fx"));
        assert_eq!(index.walk(&Subset::new()).len(), 3);
    }

    #[test]
    fn skips_names_without_time_slices() {
        let dir = tempdir().unwrap();
        for name in [
            "tas_Amon_CCSM4_rcp85_r1i1p1.nc",
            "tas_Amon_CCSM4_rcp85_r1i1p1_207101-210012-clim.nc",
            "tas_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let index = cluster_time_slices(dir.path()).unwrap();
        let key: Vec<String> = ["tas", "Amon", "CCSM4", "rcp85", "r1i1p1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            index.get_leaf(&key).unwrap(),
            &vec![dir.path().join("tas_Amon_CCSM4_rcp85_r1i1p1_200601-210012.nc")]
        );
    }

    #[test]
    fn empty_directory_gives_empty_index() {
        let dir = tempdir().unwrap();
        let index = cluster_time_slices(dir.path()).unwrap();
        assert!(index.is_empty());
    }
}
