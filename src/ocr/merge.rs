use crate::error::{Error, Result};

use super::{MergedPhrase, TextFragment};

pub const DEFAULT_MERGE_THRESHOLD: i32 = 10;

/// Groups fragments into phrases with a single greedy left-to-right pass.
///
/// A fragment joins the running phrase when its left edge is at most
/// `threshold` pixels past the phrase's right edge and its top edge is within
/// `threshold` of the phrase's top edge. Only rightward gaps are checked and
/// vertical overlap is ignored, so the result is always a partition of the
/// input into contiguous runs.
pub fn merge_phrases(fragments: &[TextFragment], threshold: i32) -> Result<Vec<MergedPhrase>> {
    if threshold < 0 {
        return Err(Error::InvalidArgument(format!(
            "merge threshold must be >= 0 (got {})",
            threshold
        )));
    }

    let (mut phrases, current) = fragments.iter().fold(
        (Vec::new(), None::<MergedPhrase>),
        |(mut phrases, current), fragment| match current {
            Some(mut phrase) if is_adjacent(&phrase, fragment, threshold) => {
                phrase.text.push(' ');
                phrase.text.push_str(&fragment.text);
                phrase.bbox = phrase.bbox.union(&fragment.bbox);
                phrase.fragments += 1;
                (phrases, Some(phrase))
            }
            Some(phrase) => {
                phrases.push(phrase);
                (phrases, Some(start_phrase(fragment)))
            }
            None => (phrases, Some(start_phrase(fragment))),
        },
    );
    if let Some(phrase) = current {
        phrases.push(phrase);
    }
    Ok(phrases)
}

fn start_phrase(fragment: &TextFragment) -> MergedPhrase {
    MergedPhrase {
        bbox: fragment.bbox,
        text: fragment.text.clone(),
        fragments: 1,
    }
}

fn is_adjacent(phrase: &MergedPhrase, fragment: &TextFragment, threshold: i32) -> bool {
    let gap = fragment.bbox.left() as i64 - phrase.bbox.right() as i64;
    let top_diff = (phrase.bbox.top() as i64 - fragment.bbox.top() as i64).abs();
    gap <= threshold as i64 && top_diff <= threshold as i64
}
