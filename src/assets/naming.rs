/// Stable file names for managed copies and thumbnails
///
/// A name is `<prefix>_<basename>_<sha1 of absolute path>` plus an extension,
/// so the same source always lands on the same file and two different sources
/// never share one.
use sha1::{Digest, Sha1};
use std::env;
use std::path::{Component, Path, PathBuf};

pub const COPY_PREFIX: &str = "copy_";
pub const THUMB_PREFIX: &str = "thumb_";
pub const THUMB_EXTENSION: &str = "jpg";

/// Segments at least this long made only of hex digits count as hashes
const HASH_SEGMENT_MIN_LEN: usize = 6;

/// Make `path` absolute and fold away `.` and `..` without touching the disk
pub fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Hex SHA-1 of the absolute form of `path`
pub fn path_digest(path: &Path) -> String {
    let absolute = absolute(path);
    let mut hasher = Sha1::new();
    hasher.update(absolute.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

/// Basename without extension, with anything unsafe for a file name replaced
pub fn sanitized_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    stem.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `copy_<basename>_<sha1>.<ext>`, keeping the source's extension
pub fn copy_name(path: &Path) -> String {
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    format!(
        "{}{}_{}{}",
        COPY_PREFIX,
        sanitized_stem(path),
        path_digest(path),
        extension
    )
}

/// `thumb_<basename>_<sha1>.jpg`
pub fn thumb_name(path: &Path) -> String {
    format!(
        "{}{}_{}.{}",
        THUMB_PREFIX,
        sanitized_stem(path),
        path_digest(path),
        THUMB_EXTENSION
    )
}

fn looks_like_hash(segment: &str) -> bool {
    segment.len() >= HASH_SEGMENT_MIN_LEN && segment.chars().all(|c| c.is_ascii_hexdigit())
}

/// Reduce a file name to the token used for fuzzy matching.
///
/// Drops the extension, any number of leading `copy_` prefixes and trailing
/// hash-like `_` segments, then keeps only lowercase ASCII letters and digits.
/// `copy_My Poster_3f2a...c9.png` and `My-Poster.png` both become `myposter`.
pub fn core_token(file_name: &str) -> String {
    stem_core(&file_stem_of(file_name))
}

/// Like [`core_token`] for a thumbnail file name: the `thumb_` prefix is
/// dropped too, leaving the token of the asset it was rendered from.
///
/// `thumb_copy_alpha_<sha1>_<sha1>.jpg` becomes `alpha`.
pub fn thumb_core_token(file_name: &str) -> String {
    let stem = file_stem_of(file_name);
    stem_core(stem.strip_prefix(THUMB_PREFIX).unwrap_or(&stem))
}

/// Token of an asset as it appears inside managed file names
pub fn asset_core_token(path: &Path) -> String {
    stem_core(&sanitized_stem(path))
}

fn file_stem_of(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn stem_core(stem: &str) -> String {
    let mut stem = stem;
    while let Some(rest) = stem.strip_prefix(COPY_PREFIX) {
        stem = rest;
    }

    let mut segments: Vec<&str> = stem.split('_').collect();
    while segments.last().is_some_and(|s| looks_like_hash(s)) {
        segments.pop();
    }

    segments
        .join("_")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// True when either token contains the other
pub fn tokens_overlap(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_deterministic() {
        let path = Path::new("/media/posters/x.png");
        assert_eq!(copy_name(path), copy_name(path));
        assert_eq!(thumb_name(path), thumb_name(path));
    }

    #[test]
    fn copy_name_keeps_extension_and_hashes_absolute_path() {
        let name = copy_name(Path::new("/tmp/x.png"));
        assert!(name.starts_with("copy_x_"));
        assert!(name.ends_with(".png"));

        let digest = &name["copy_x_".len()..name.len() - ".png".len()];
        assert_eq!(digest.len(), 40);
        assert_eq!(digest, path_digest(Path::new("/tmp/x.png")));
    }

    #[test]
    fn thumb_name_is_always_jpg() {
        let name = thumb_name(Path::new("/tmp/frame.webp"));
        assert!(name.starts_with("thumb_frame_"));
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn different_paths_with_same_basename_differ() {
        let a = copy_name(Path::new("/one/cover.png"));
        let b = copy_name(Path::new("/two/cover.png"));
        assert_ne!(a, b);
    }

    #[test]
    fn dot_segments_do_not_change_the_name() {
        let plain = copy_name(Path::new("/shows/art/cover.png"));
        let dotted = copy_name(Path::new("/shows/./extra/../art/cover.png"));
        assert_eq!(plain, dotted);
    }

    #[test]
    fn relative_paths_hash_like_their_absolute_form() {
        let cwd = env::current_dir().unwrap();
        assert_eq!(
            copy_name(Path::new("cover.png")),
            copy_name(&cwd.join("cover.png"))
        );
    }

    #[test]
    fn unsafe_characters_are_sanitized() {
        assert_eq!(sanitized_stem(Path::new("/a/My Poster:1?.png")), "My_Poster_1_");
    }

    #[test]
    fn core_token_strips_prefix_and_hash() {
        let name = copy_name(Path::new("/tmp/My Poster.png"));
        assert_eq!(core_token(&name), "myposter");
        assert_eq!(core_token("copy_copy_Hero_abcdef12_0123456789.jpg"), "hero");
        assert_eq!(core_token("My-Poster (1).png"), "myposter1");
    }

    #[test]
    fn short_hex_segments_are_kept() {
        // "ep01" is not hash-like, neither is a five character hex run
        assert_eq!(core_token("show_ep01.png"), "showep01");
        assert_eq!(core_token("show_abcde.png"), "showabcde");
    }

    #[test]
    fn thumb_token_ignores_prefix_and_digests() {
        let thumb_of_copy = thumb_name(Path::new(&format!(
            "/c/{}",
            copy_name(Path::new("/tmp/alpha.png"))
        )));
        assert_eq!(thumb_core_token(&thumb_of_copy), "alpha");
        assert_eq!(thumb_core_token(&thumb_name(Path::new("/tmp/My Poster.png"))), "myposter");
    }

    #[test]
    fn asset_token_matches_the_sanitized_name() {
        assert_eq!(asset_core_token(Path::new("/tmp/My Poster.v2.png")), "myposterv2");
        assert_eq!(
            asset_core_token(Path::new("/c/copy_b_0123456789abcdef.png")),
            "b"
        );
    }

    #[test]
    fn overlap_is_symmetric_and_ignores_empty() {
        assert!(tokens_overlap("myposter", "myposter1"));
        assert!(tokens_overlap("myposter1", "myposter"));
        assert!(!tokens_overlap("", "anything"));
        assert!(!tokens_overlap("alpha", "bravo"));
    }
}
