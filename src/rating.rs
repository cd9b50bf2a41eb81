//! Rating criteria model and draft records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// What kind of media a rating applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
  Movie,
  Series,
}

/// Six-axis criteria for a movie rating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovieCriteria {
  pub acting: f64,
  pub visuals: f64,
  pub story: f64,
  pub climax: f64,
  pub pacing: f64,
  pub ending: f64,
}

/// Six-axis criteria for a series rating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesCriteria {
  pub acting: f64,
  pub visuals: f64,
  pub story: f64,
  pub length: f64,
  pub pacing: f64,
  pub ending: f64,
}

/// Criteria for one rating. The two shapes differ only in the middle axis:
/// movies rate the climax, series rate the length. Serialized untagged; the
/// distinguishing field keeps the shapes disjoint on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Criteria {
  Movie(MovieCriteria),
  Series(SeriesCriteria),
}

impl Criteria {
  pub fn kind(&self) -> MediaKind {
    match self {
      Criteria::Movie(_) => MediaKind::Movie,
      Criteria::Series(_) => MediaKind::Series,
    }
  }

  /// The six axis values in display order.
  pub fn axes(&self) -> [f64; 6] {
    match self {
      Criteria::Movie(c) => [c.acting, c.visuals, c.story, c.climax, c.pacing, c.ending],
      Criteria::Series(c) => [c.acting, c.visuals, c.story, c.length, c.pacing, c.ending],
    }
  }

  /// Unweighted mean of the six axes, rounded to one decimal.
  pub fn overall(&self) -> f64 {
    let axes = self.axes();
    let mean = axes.iter().sum::<f64>() / axes.len() as f64;
    (mean * 10.0).round() / 10.0
  }
}

/// An in-progress or previously submitted rating, keyed externally by the
/// film id it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingDraft {
  pub media_id: String,
  pub kind: MediaKind,
  pub title: String,
  pub release_date: Option<NaiveDate>,
  pub overall: f64,
  pub criteria: Criteria,
  pub rated_at: DateTime<Utc>,
}

impl RatingDraft {
  pub fn new(
    media_id: impl Into<String>,
    title: impl Into<String>,
    release_date: Option<NaiveDate>,
    criteria: Criteria,
    rated_at: DateTime<Utc>,
  ) -> Self {
    Self {
      media_id: media_id.into(),
      kind: criteria.kind(),
      title: title.into(),
      release_date,
      overall: criteria.overall(),
      criteria,
      rated_at,
    }
  }
}

/// Partial update to a draft. `None` fields are left untouched; a new
/// criteria value recomputes the overall.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingDraftPatch {
  pub title: Option<String>,
  pub release_date: Option<NaiveDate>,
  pub criteria: Option<Criteria>,
}

impl RatingDraftPatch {
  pub fn apply(self, draft: &mut RatingDraft) {
    if let Some(title) = self.title {
      draft.title = title;
    }
    if let Some(date) = self.release_date {
      draft.release_date = Some(date);
    }
    if let Some(criteria) = self.criteria {
      draft.kind = criteria.kind();
      draft.overall = criteria.overall();
      draft.criteria = criteria;
    }
  }
}
