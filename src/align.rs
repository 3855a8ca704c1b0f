use crate::kana::{self, ReadingMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Ruby {
        base: String,
        kana: String,
        reading: String,
    },
}

// Each non-kanji char is located in the reading (searching from one past the
// cursor when a kanji run is pending, so the run gets at least one reading char).
// The reading between the cursor and that match goes to the pending kanji run.
// If the char cannot be found, the rest of the reading goes to the pending run.
pub fn align(surface: &str, reading: &str, mode: ReadingMode) -> Vec<Segment> {
    let reading: Vec<char> = kana::to_hiragana(reading).chars().collect();
    let mut segments = Vec::new();
    let mut kanji_run = String::new();
    let mut cursor = 0usize;

    for ch in surface.chars() {
        if kana::is_kanji(ch) {
            kanji_run.push(ch);
            continue;
        }
        let needle: Vec<char> = kana::to_hiragana(&ch.to_string()).chars().collect();
        let from = if kanji_run.is_empty() { cursor } else { cursor + 1 };
        let found = find_from(&reading, &needle, from).unwrap_or(reading.len());
        flush_run(&mut segments, &mut kanji_run, &reading, cursor, found, mode);
        push_text(&mut segments, ch);
        cursor = found + 1;
    }
    flush_run(
        &mut segments,
        &mut kanji_run,
        &reading,
        cursor,
        reading.len(),
        mode,
    );
    segments
}

pub fn render_reading(surface: &str, reading: &str, mode: ReadingMode) -> String {
    render_segments(&align(surface, reading, mode))
}

pub fn render_segments(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(&escape_html(text)),
            Segment::Ruby { base, reading, .. } => {
                out.push_str("<ruby>");
                out.push_str(&escape_html(base));
                out.push_str("<rt>");
                out.push_str(&escape_html(reading));
                out.push_str("</rt></ruby>");
            }
        }
    }
    out
}

pub fn plain_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Text(text) => text.as_str(),
            Segment::Ruby { base, .. } => base.as_str(),
        })
        .collect()
}

pub(crate) fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn flush_run(
    segments: &mut Vec<Segment>,
    kanji_run: &mut String,
    reading: &[char],
    from: usize,
    to: usize,
    mode: ReadingMode,
) {
    if kanji_run.is_empty() {
        return;
    }
    let kana: String = slice(reading, from, to).iter().collect();
    let rendered = kana::convert(&kana, mode);
    segments.push(Segment::Ruby {
        base: std::mem::take(kanji_run),
        kana,
        reading: rendered,
    });
}

fn push_text(segments: &mut Vec<Segment>, ch: char) {
    if let Some(Segment::Text(text)) = segments.last_mut() {
        text.push(ch);
        return;
    }
    segments.push(Segment::Text(ch.to_string()));
}

fn slice(chars: &[char], from: usize, to: usize) -> &[char] {
    let to = to.min(chars.len());
    if from >= to {
        return &[];
    }
    &chars[from..to]
}

fn find_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| position + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ruby(base: &str, reading: &str) -> Segment {
        Segment::Ruby {
            base: base.to_string(),
            kana: reading.to_string(),
            reading: reading.to_string(),
        }
    }

    #[test]
    fn okurigana_stays_outside_the_ruby() {
        let segments = align("食べる", "たべる", ReadingMode::Hiragana);
        assert_eq!(
            segments,
            vec![ruby("食", "た"), Segment::Text("べる".to_string())]
        );
        assert_eq!(
            render_reading("食べる", "たべる", ReadingMode::Hiragana),
            "<ruby>食<rt>た</rt></ruby>べる"
        );
    }

    #[test]
    fn kanji_runs_between_kana() {
        let segments = align("お見舞い", "おみまい", ReadingMode::Hiragana);
        assert_eq!(
            segments,
            vec![
                Segment::Text("お".to_string()),
                ruby("見舞", "みま"),
                Segment::Text("い".to_string()),
            ]
        );
    }

    #[test]
    fn supplementary_plane_kanji_join_the_run() {
        let segments = align("𠮷野家", "よしのや", ReadingMode::Hiragana);
        assert_eq!(segments, vec![ruby("𠮷野家", "よしのや")]);
        assert_eq!(
            render_reading("𠮷田さん", "よしださん", ReadingMode::Hiragana),
            "<ruby>𠮷田<rt>よしだ</rt></ruby>さん"
        );
    }

    #[test]
    fn katakana_reading_is_normalised() {
        assert_eq!(
            render_reading("日本", "ニホン", ReadingMode::Hiragana),
            "<ruby>日本<rt>にほん</rt></ruby>"
        );
    }

    #[test]
    fn ruby_text_follows_the_mode() {
        assert_eq!(
            render_reading("漢字", "かんじ", ReadingMode::Katakana),
            "<ruby>漢字<rt>カンジ</rt></ruby>"
        );
        assert_eq!(
            render_reading("漢字", "かんじ", ReadingMode::Romaji),
            "<ruby>漢字<rt>kanji</rt></ruby>"
        );
    }

    #[test]
    fn empty_reading_gives_empty_ruby_text() {
        assert_eq!(
            render_reading("本", "", ReadingMode::Hiragana),
            "<ruby>本<rt></rt></ruby>"
        );
    }

    #[test]
    fn unmatched_kana_hands_rest_of_reading_to_run() {
        let segments = align("行く", "いった", ReadingMode::Hiragana);
        assert_eq!(
            segments,
            vec![ruby("行", "いった"), Segment::Text("く".to_string())]
        );
    }

    #[test]
    fn stripping_markup_restores_surface() {
        for (surface, reading) in [
            ("食べ物", "たべもの"),
            ("お茶", "おちゃ"),
            ("東京都", "とうきょうと"),
            ("a<b>", ""),
        ] {
            let segments = align(surface, reading, ReadingMode::Hiragana);
            assert_eq!(plain_text(&segments), surface);
        }
    }

    #[test]
    fn literal_text_is_escaped() {
        assert_eq!(
            render_reading("<&>", "", ReadingMode::Hiragana),
            "&lt;&amp;&gt;"
        );
    }
}
