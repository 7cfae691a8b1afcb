//! Tag container cleaning

use crate::error::MetadataError;
use crate::sanitize::sanitize_text;
use lofty::{
    config::WriteOptions,
    file::{AudioFile, TaggedFileExt},
    read_from_path,
    tag::{Accessor, ItemKey, ItemValue, Tag, TagItem},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sanitize title, artist, album and every comment of `tag`
pub fn clean_tag(tag: &mut Tag) {
    if let Some(title) = tag.title().map(|t| sanitize_text(&t)) {
        tag.set_title(title);
    }
    if let Some(artist) = tag.artist().map(|a| sanitize_text(&a)) {
        tag.set_artist(artist);
    }
    if let Some(album) = tag.album().map(|a| sanitize_text(&a)) {
        tag.set_album(album);
    }

    let comments: Vec<String> = tag
        .get_strings(&ItemKey::Comment)
        .map(sanitize_text)
        .collect();
    if !comments.is_empty() {
        tag.remove_key(&ItemKey::Comment);
        for comment in comments {
            tag.push(TagItem::new(ItemKey::Comment, ItemValue::Text(comment)));
        }
    }
}

/// Clean the primary tag of the file at `path` in place.
///
/// Returns `false` when the file carries no tag container at all.
pub fn clean_file_tags(path: &Path) -> Result<bool, MetadataError> {
    info!("Cleaning tags: {}", path.display());

    let mut tagged_file = read_from_path(path).map_err(|source| MetadataError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let Some(tag) = tagged_file.primary_tag_mut() else {
        debug!("No tag container in {}", path.display());
        return Ok(false);
    };
    clean_tag(tag);

    tagged_file
        .save_to_path(path, WriteOptions::default())
        .map_err(|source| MetadataError::Save {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(true)
}

/// Run [`clean_file_tags`] on the blocking pool
pub async fn clean_file_tags_blocking(path: PathBuf) -> Result<bool, MetadataError> {
    tokio::task::spawn_blocking(move || clean_file_tags(&path))
        .await
        .map_err(|e| MetadataError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofty::tag::TagType;

    #[test]
    fn test_clean_tag() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.set_title("Café — Live!".to_string());
        tag.set_artist("Ärtist & Friends".to_string());
        tag.set_album("Best  of ★ 2020".to_string());
        tag.push(TagItem::new(
            ItemKey::Comment,
            ItemValue::Text("Visit https://x.y  now".to_string()),
        ));
        tag.push(TagItem::new(
            ItemKey::Comment,
            ItemValue::Text("#tags @here".to_string()),
        ));

        clean_tag(&mut tag);

        assert_eq!(tag.title().as_deref(), Some("Caf Live!"));
        assert_eq!(tag.artist().as_deref(), Some("rtist Friends"));
        assert_eq!(tag.album().as_deref(), Some("Best of 2020"));
        let comments: Vec<&str> = tag.get_strings(&ItemKey::Comment).collect();
        assert_eq!(comments, vec!["Visit httpsx.y now", "tags here"]);
    }

    #[test]
    fn test_clean_tag_leaves_missing_fields() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.set_title("Plain".to_string());

        clean_tag(&mut tag);

        assert_eq!(tag.title().as_deref(), Some("Plain"));
        assert!(tag.artist().is_none());
        assert_eq!(tag.get_strings(&ItemKey::Comment).count(), 0);
    }

    #[test]
    fn test_unreadable_file() {
        let err = clean_file_tags(Path::new("/nonexistent/ytmp3-test.mp3")).unwrap_err();
        assert!(matches!(err, MetadataError::Open { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_file_tags_roundtrip() {
        use crate::test_support::write_mp3;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        write_mp3(&path, Some("Fake: Song! ★"), Some("Visit https://x.y"));

        assert!(clean_file_tags(&path).unwrap());

        let tagged = read_from_path(&path).unwrap();
        let tag = tagged.primary_tag().unwrap();
        assert_eq!(tag.title().as_deref(), Some("Fake Song!"));
        assert_eq!(tag.get_string(&ItemKey::Comment), Some("Visit httpsx.y"));
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_file_without_tags() {
        use crate::test_support::write_mp3;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.mp3");
        write_mp3(&path, None, None);

        assert!(!clean_file_tags(&path).unwrap());
    }
}
