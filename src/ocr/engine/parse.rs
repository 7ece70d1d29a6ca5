use crate::ocr::{BoundingBox, TextFragment};

const WORD_LEVEL: i32 = 5;

/// Word rows of `tesseract ... tsv` output, in reading order.
pub(crate) fn parse_tsv_words(tsv: &str) -> Vec<TextFragment> {
    let mut words = Vec::new();
    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != WORD_LEVEL {
            continue;
        }
        let left: i32 = cols[6].parse().unwrap_or(0);
        let top: i32 = cols[7].parse().unwrap_or(0);
        let width: i32 = cols[8].parse().unwrap_or(0);
        let height: i32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        words.push(TextFragment::new(
            BoundingBox::new(left, top, left + width, top + height),
            text,
        ));
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
4\t1\t1\t1\t1\t0\t10\t12\t120\t20\t-1\t
5\t1\t1\t1\t1\t1\t10\t12\t50\t20\t96.5\tHello
5\t1\t1\t1\t1\t2\t66\t13\t64\t19\t91.0\tworld
5\t1\t1\t1\t1\t3\t140\t13\t5\t19\t-1\t 
5\t1\t1\t1\t2\t1\t10\t50\t70\t22\t88.2\tAgain";

    #[test]
    fn word_rows_become_fragments() {
        let words = parse_tsv_words(TSV);
        let texts: Vec<_> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", "world", "Again"]);
        assert_eq!(words[1].bbox, BoundingBox::new(66, 13, 130, 32));
    }

    #[test]
    fn short_rows_are_ignored() {
        assert!(parse_tsv_words("header\n5\t1\t1").is_empty());
    }
}
