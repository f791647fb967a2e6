use crate::error::{PipelineError, Result};

/// One BIO tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BioTag {
    /// Outside any span.
    Outside,
    /// First token of a span of this type.
    Begin(String),
    /// Continuation of a span of this type.
    Inside(String),
}

impl BioTag {
    /// Parse `O`, `B-X` or `I-X`.
    pub fn parse(label: &str) -> Option<Self> {
        if label == "O" {
            return Some(BioTag::Outside);
        }
        let (prefix, kind) = label.split_once('-')?;
        if kind.is_empty() {
            return None;
        }
        match prefix {
            "B" => Some(BioTag::Begin(kind.to_string())),
            "I" => Some(BioTag::Inside(kind.to_string())),
            _ => None,
        }
    }
}

/// The configured labels, parsed as BIO tags in class-index order.
#[derive(Debug, Clone)]
pub struct TagScheme {
    tags: Vec<BioTag>,
}

impl TagScheme {
    /// Parse every label; a label that is not BIO is a config error on `labels[i]`.
    pub fn from_labels(labels: &[String]) -> Result<Self> {
        let tags = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                BioTag::parse(label).ok_or_else(|| {
                    PipelineError::config(
                        format!("labels[{i}]"),
                        format!("expected `O`, `B-<type>` or `I-<type>`, got `{label}`"),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tags })
    }

    /// Tag of a class index.
    pub fn tag(&self, index: usize) -> Option<&BioTag> {
        self.tags.get(index)
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// True if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// A decoded span over token indices `[start, end)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TokenSpan {
    pub kind: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// Group per-token `(class index, score)` predictions into spans.
pub(crate) fn group_spans(scheme: &TagScheme, predictions: &[(usize, f32)]) -> Vec<TokenSpan> {
    let mut spans = Vec::new();
    let mut open: Option<(String, usize, Vec<f32>)> = None;

    let close = |open: &mut Option<(String, usize, Vec<f32>)>, end: usize, spans: &mut Vec<TokenSpan>| {
        if let Some((kind, start, scores)) = open.take() {
            let score = scores.iter().sum::<f32>() / scores.len() as f32;
            spans.push(TokenSpan {
                kind,
                start,
                end,
                score,
            });
        }
    };

    for (i, &(class, score)) in predictions.iter().enumerate() {
        match scheme.tag(class) {
            Some(BioTag::Begin(kind)) => {
                close(&mut open, i, &mut spans);
                open = Some((kind.clone(), i, vec![score]));
            }
            Some(BioTag::Inside(kind)) => {
                let continues = matches!(&open, Some((open_kind, _, _)) if open_kind == kind);
                if continues {
                    if let Some((_, _, scores)) = open.as_mut() {
                        scores.push(score);
                    }
                } else {
                    close(&mut open, i, &mut spans);
                    open = Some((kind.clone(), i, vec![score]));
                }
            }
            Some(BioTag::Outside) | None => close(&mut open, i, &mut spans),
        }
    }
    close(&mut open, predictions.len(), &mut spans);
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> TagScheme {
        let labels: Vec<String> = ["O", "B-LOC", "I-LOC", "B-PER", "I-PER"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        TagScheme::from_labels(&labels).unwrap()
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(BioTag::parse("O"), Some(BioTag::Outside));
        assert_eq!(BioTag::parse("B-LOC"), Some(BioTag::Begin("LOC".into())));
        assert_eq!(BioTag::parse("I-MISC"), Some(BioTag::Inside("MISC".into())));
        assert_eq!(BioTag::parse("X-LOC"), None);
        assert_eq!(BioTag::parse("B-"), None);
        assert_eq!(BioTag::parse("LOC"), None);
    }

    #[test]
    fn test_non_bio_label_is_config_error() {
        let labels = vec!["O".to_string(), "person".to_string()];
        match TagScheme::from_labels(&labels).unwrap_err() {
            PipelineError::Config { field, .. } => assert_eq!(field, "labels[1]"),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_grouping() {
        // B-PER I-PER O B-LOC B-LOC I-LOC
        let preds = [(3, 0.9), (4, 0.7), (0, 0.99), (1, 0.6), (1, 0.8), (2, 0.4)];
        let spans = group_spans(&scheme(), &preds);
        assert_eq!(spans.len(), 3);
        assert_eq!((spans[0].kind.as_str(), spans[0].start, spans[0].end), ("PER", 0, 2));
        assert!((spans[0].score - 0.8).abs() < 1e-6);
        assert_eq!((spans[1].start, spans[1].end), (3, 4));
        assert_eq!((spans[2].start, spans[2].end), (4, 6));
        assert!((spans[2].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_inside_without_begin_opens_span() {
        // I-LOC I-PER I-PER
        let preds = [(2, 0.5), (4, 0.5), (4, 0.5)];
        let spans = group_spans(&scheme(), &preds);
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].kind.as_str(), spans[0].start, spans[0].end), ("LOC", 0, 1));
        assert_eq!((spans[1].kind.as_str(), spans[1].start, spans[1].end), ("PER", 1, 3));
    }
}
