use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::types::ContentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
  Movie,
  Episode,
}

/// Content locator handed in by the caller. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
  pub content_id: ContentId,
  pub kind: ContentKind,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub season: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub episode: Option<u32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
  #[error("content id is empty")]
  EmptyContentId,

  #[error("content id contains whitespace or control characters")]
  MalformedContentId,

  #[error("episode requests need a {0}")]
  Missing(&'static str),

  #[error("{0} must be positive")]
  NotPositive(&'static str),
}

impl ExtractionRequest {
  pub fn movie(content_id: impl Into<ContentId>) -> Self {
    Self {
      content_id: content_id.into(),
      kind: ContentKind::Movie,
      season: None,
      episode: None,
    }
  }

  pub fn episode(content_id: impl Into<ContentId>, season: u32, episode: u32) -> Self {
    Self {
      content_id: content_id.into(),
      kind: ContentKind::Episode,
      season: Some(season),
      episode: Some(episode),
    }
  }

  /// Boundary check run before any network call.
  pub fn validate(&self) -> Result<(), RequestError> {
    let id = self.content_id.trim();
    if id.is_empty() {
      return Err(RequestError::EmptyContentId);
    }
    if self
      .content_id
      .chars()
      .any(|c| c.is_whitespace() || c.is_control())
    {
      return Err(RequestError::MalformedContentId);
    }

    if self.kind == ContentKind::Episode {
      match self.season {
        None => return Err(RequestError::Missing("season")),
        Some(0) => return Err(RequestError::NotPositive("season")),
        Some(_) => {}
      }
      match self.episode {
        None => return Err(RequestError::Missing("episode")),
        Some(0) => return Err(RequestError::NotPositive("episode")),
        Some(_) => {}
      }
    }

    Ok(())
  }
}

impl std::fmt::Display for ExtractionRequest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match (self.kind, self.season, self.episode) {
      (ContentKind::Episode, Some(s), Some(e)) => {
        write!(f, "{} S{:02}E{:02}", self.content_id, s, e)
      }
      _ => write!(f, "{}", self.content_id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_movie_is_valid() {
    assert!(ExtractionRequest::movie("tt0111161").validate().is_ok());
  }

  #[test]
  fn test_episode_requires_season_and_episode() {
    let mut req = ExtractionRequest::episode("1399", 1, 1);
    assert!(req.validate().is_ok());

    req.season = None;
    assert_eq!(req.validate(), Err(RequestError::Missing("season")));

    req.season = Some(1);
    req.episode = Some(0);
    assert_eq!(req.validate(), Err(RequestError::NotPositive("episode")));
  }

  #[test]
  fn test_blank_or_spaced_id_rejected() {
    assert_eq!(
      ExtractionRequest::movie("  ").validate(),
      Err(RequestError::EmptyContentId)
    );
    assert_eq!(
      ExtractionRequest::movie("tt01 11").validate(),
      Err(RequestError::MalformedContentId)
    );
  }

  #[test]
  fn test_display_includes_episode() {
    let req = ExtractionRequest::episode("1399", 2, 7);
    assert_eq!(req.to_string(), "1399 S02E07");
  }
}
