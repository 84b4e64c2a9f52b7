//! Destination planning: every job gets its own file under the output directory.

use crate::types::UrlEntry;
use log::warn;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

const NAME_MAX: usize = 255;

/// Last non-empty path segment of `url`, percent-decoded, if any.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    Some(decoded)
}

/// Name the engine writes to until the download at `path` is complete.
pub fn part_path(path: &Path) -> PathBuf {
    with_suffix(path, ".part")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Every file a job may create: the final file, its `.part` file and
/// aria2c's `.part.aria2` control file.
fn reserved_paths(path: &Path) -> [PathBuf; 3] {
    let part = part_path(path);
    let control = with_suffix(&part, ".aria2");
    [path.to_path_buf(), part, control]
}

/// Replaces path separators and control characters, trims dots and spaces,
/// and caps the result at 255 bytes.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.len() <= NAME_MAX {
        return trimmed.to_string();
    }

    let mut take = NAME_MAX;
    while take > 0 && !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}

/// Resolves one output path per entry, in order. No two jobs share any file
/// they write, including working files: a collision gets `_1`, `_2`, ...
/// inserted before the extension.
pub fn plan_destinations(entries: &[UrlEntry], output_dir: &Path) -> Vec<PathBuf> {
    let mut taken = HashSet::new();

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let candidate = match &entry.destination {
                Some(dest) if dest.is_absolute() => dest.clone(),
                Some(dest) => output_dir.join(dest),
                None => {
                    let name = filename_from_url(&entry.url)
                        .map(|n| sanitize_filename(&n))
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| format!("download_{}", idx + 1));
                    output_dir.join(name)
                }
            };

            let path = unique_path(&candidate, &taken);
            if path != candidate {
                warn!(
                    "Destination {} is already used, saving {} as {}",
                    candidate.display(),
                    entry.url,
                    path.display()
                );
            }
            taken.extend(reserved_paths(&path));
            path
        })
        .collect()
}

fn clashes(path: &Path, taken: &HashSet<PathBuf>) -> bool {
    reserved_paths(path).iter().any(|p| taken.contains(p))
}

fn unique_path(candidate: &Path, taken: &HashSet<PathBuf>) -> PathBuf {
    if !clashes(candidate, taken) {
        return candidate.to_path_buf();
    }

    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = candidate
        .extension()
        .map(|e| e.to_string_lossy().to_string());

    let mut counter = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let path = candidate.with_file_name(name);
        if !clashes(&path, taken) {
            return path;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_last_segment() {
        assert_eq!(
            filename_from_url("https://example.com/pub/debian.iso?x=1"),
            Some("debian.iso".to_string())
        );
        assert_eq!(
            filename_from_url("https://example.com/pub/dir/"),
            Some("dir".to_string())
        );
        assert_eq!(filename_from_url("https://example.com/"), None);
    }

    #[test]
    fn filename_is_percent_decoded() {
        assert_eq!(
            filename_from_url("https://example.com/isos/a%20b.iso"),
            Some("a b.iso".to_string())
        );
        let planned = plan_destinations(
            &[UrlEntry::new("https://example.com/x%2Fy.bin")],
            Path::new("/out"),
        );
        assert_eq!(planned[0], PathBuf::from("/out/x_y.bin"));
    }

    #[test]
    fn sanitize_strips_separators_and_dots() {
        assert_eq!(sanitize_filename("a\\b\x07c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_filename("..hidden."), "hidden");
    }

    #[test]
    fn sanitize_caps_length_on_char_boundary() {
        let long = "é".repeat(200);
        let out = sanitize_filename(&long);
        assert!(out.len() <= NAME_MAX);
        assert!(out.chars().all(|c| c == 'é'));
    }

    #[test]
    fn duplicate_names_get_counter() {
        let entries = vec![
            UrlEntry::new("https://a.example/index.html"),
            UrlEntry::new("https://b.example/index.html"),
            UrlEntry::new("https://c.example/index.html"),
        ];
        let paths = plan_destinations(&entries, Path::new("/out"));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/out/index.html"),
                PathBuf::from("/out/index_1.html"),
                PathBuf::from("/out/index_2.html"),
            ]
        );
    }

    #[test]
    fn working_files_never_overlap_other_jobs() {
        let forward = plan_destinations(
            &[
                UrlEntry::new("https://example.com/a.bin"),
                UrlEntry::new("https://example.com/a.bin.part"),
            ],
            Path::new("/out"),
        );
        assert_eq!(forward[0], PathBuf::from("/out/a.bin"));
        assert_eq!(forward[1], PathBuf::from("/out/a.bin_1.part"));

        let reverse = plan_destinations(
            &[
                UrlEntry::new("https://example.com/a.bin.part"),
                UrlEntry::new("https://example.com/a.bin"),
            ],
            Path::new("/out"),
        );
        assert_eq!(reverse[0], PathBuf::from("/out/a.bin.part"));
        assert_eq!(reverse[1], PathBuf::from("/out/a_1.bin"));

        for planned in [forward, reverse] {
            let mut files = HashSet::new();
            for path in &planned {
                for reserved in reserved_paths(path) {
                    assert!(files.insert(reserved.clone()), "{} used twice", reserved.display());
                }
            }
        }
    }

    #[test]
    fn aria2_control_file_is_reserved() {
        let planned = plan_destinations(
            &[
                UrlEntry::new("https://example.com/a.bin"),
                UrlEntry::new("https://example.com/a.bin.part.aria2"),
            ],
            Path::new("/out"),
        );
        assert_eq!(planned[1], PathBuf::from("/out/a.bin.part_1.aria2"));
    }

    #[test]
    fn overrides_resolve_against_output_dir() {
        let mut relative = UrlEntry::new("https://example.com/a");
        relative.destination = Some(PathBuf::from("sub/a.bin"));
        let mut absolute = UrlEntry::new("https://example.com/b");
        absolute.destination = Some(PathBuf::from("/elsewhere/b.bin"));

        let paths = plan_destinations(&[relative, absolute], Path::new("/out"));
        assert_eq!(paths[0], PathBuf::from("/out/sub/a.bin"));
        assert_eq!(paths[1], PathBuf::from("/elsewhere/b.bin"));
    }

    #[test]
    fn url_without_path_falls_back_to_index() {
        let entries = vec![
            UrlEntry::new("https://example.com/x.bin"),
            UrlEntry::new("https://example.com/"),
        ];
        let paths = plan_destinations(&entries, Path::new("/out"));
        assert_eq!(paths[1], PathBuf::from("/out/download_2"));
    }
}
