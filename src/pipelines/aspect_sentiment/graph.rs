//! Word graph, position weights and the SenticNet lexicon.

use crate::error::{PipelineError, Result};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Lowercased word to SenticNet polarity in `[-1, 1]`.
pub type SenticLexicon = HashMap<String, f32>;

/// Read a `word<TAB>score` lexicon. Blank lines and lines starting with `#` are skipped.
pub fn load_sentic_lexicon(path: &Path) -> Result<SenticLexicon> {
    let file = std::fs::File::open(path).map_err(|e| {
        PipelineError::unavailable("sentic_lexicon", format!("cannot open '{}': {e}", path.display()))
    })?;

    let mut lexicon = SenticLexicon::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| {
            PipelineError::corrupt("sentic_lexicon", "UTF-8 text", format!("line {}: {e}", line_no + 1))
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let bad_line = |found: &str| {
            PipelineError::corrupt(
                "sentic_lexicon",
                "`word<TAB>score` with score in [-1, 1]",
                format!("{found} on line {}", line_no + 1),
            )
        };
        let (word, score) = line.rsplit_once('\t').ok_or_else(|| bad_line("no tab"))?;
        let score: f32 = score
            .trim()
            .parse()
            .map_err(|_| bad_line(&format!("score `{}`", score.trim())))?;
        if !(-1.0..=1.0).contains(&score) {
            return Err(bad_line(&format!("score {score}")));
        }
        lexicon.insert(word.trim().to_lowercase(), score);
    }

    debug!(entries = lexicon.len(), "sentic lexicon loaded");
    Ok(lexicon)
}

/// Token index range `[start, end)` of the tokens overlapping a character span.
pub(crate) fn token_range(offsets: &[(usize, usize)], span: (usize, usize)) -> Option<(usize, usize)> {
    let mut hits = offsets
        .iter()
        .enumerate()
        .filter(|(_, offset)| offset.0 < span.1 && offset.1 > span.0)
        .map(|(i, _)| i);
    let first = hits.next()?;
    let last = hits.last().unwrap_or(first);
    Some((first, last + 1))
}

/// Context weights: decay with distance from the aspect, 0 on the aspect itself.
pub(crate) fn position_weights(len: usize, aspect: (usize, usize)) -> Vec<f32> {
    let (start, end) = aspect;
    let context_len = (len - (end - start)) as f32;
    (0..len)
        .map(|j| {
            if j < start {
                1.0 - (start - j) as f32 / context_len
            } else if j < end {
                0.0
            } else {
                1.0 - (j + 1 - end) as f32 / context_len
            }
        })
        .collect()
}

/// 1 on aspect tokens, 0 elsewhere.
pub(crate) fn aspect_mask(len: usize, aspect: (usize, usize)) -> Vec<f32> {
    (0..len)
        .map(|j| if j >= aspect.0 && j < aspect.1 { 1.0 } else { 0.0 })
        .collect()
}

/// Row-major `len x len` weighted adjacency over a `window`-wide neighbourhood.
pub(crate) fn adjacency(len: usize, window: usize, sentic: &[f32], aspect: (usize, usize)) -> Vec<f32> {
    let in_aspect = |i: usize| i >= aspect.0 && i < aspect.1;
    let mut adj = vec![0f32; len * len];
    for i in 0..len {
        for j in i.saturating_sub(window)..(i + window + 1).min(len) {
            let mut weight = 1.0 + sentic[i].abs() + sentic[j].abs();
            if in_aspect(i) || in_aspect(j) {
                weight += 1.0;
            }
            adj[i * len + j] = weight;
        }
    }
    adj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_range() {
        let offsets = [(0, 3), (4, 8), (9, 12), (13, 18)];
        assert_eq!(token_range(&offsets, (4, 12)), Some((1, 3)));
        assert_eq!(token_range(&offsets, (5, 6)), Some((1, 2)));
        assert_eq!(token_range(&offsets, (19, 22)), None);
    }

    #[test]
    fn test_position_weights() {
        // five tokens, aspect at 2..3, context length 4
        let w = position_weights(5, (2, 3));
        assert_eq!(w, vec![0.5, 0.75, 0.0, 0.75, 0.5]);
        assert_eq!(position_weights(2, (0, 2)), vec![0.0, 0.0]);
    }

    #[test]
    fn test_adjacency_weights() {
        let sentic = [0.0, 0.5, -0.25];
        let adj = adjacency(3, 1, &sentic, (0, 1));
        // self loop on the aspect token
        assert_eq!(adj[0], 2.0);
        // aspect edge with sentic endpoint
        assert_eq!(adj[1], 2.5);
        // outside the window
        assert_eq!(adj[2], 0.0);
        // plain context edge: 1 + 0.5 + 0.25
        assert_eq!(adj[3 + 2], 1.75);
        assert_eq!(adj[2 * 3 + 1], adj[3 + 2]);
    }

    #[test]
    fn test_lexicon_parsing() {
        let dir = std::env::temp_dir().join(format!("sgnlp-sentic-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("senticnet.tsv");
        std::fs::write(&path, "# word\tscore\nGreat\t0.9\nawful\t-0.8\n\n").unwrap();
        let lexicon = load_sentic_lexicon(&path).unwrap();
        assert_eq!(lexicon.len(), 2);
        assert_eq!(lexicon["great"], 0.9);

        std::fs::write(&path, "great\t3\n").unwrap();
        assert!(matches!(
            load_sentic_lexicon(&path),
            Err(PipelineError::ArtifactCorrupt { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
