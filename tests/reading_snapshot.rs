use furigana_annotator_rust::ReadingMode;
use furigana_annotator_rust::align::render_reading;

#[test]
fn ruby_markup_snapshot() {
    let words = [
        ("食べる", "タベル", ReadingMode::Hiragana),
        ("日本語", "ニホンゴ", ReadingMode::Hiragana),
        ("お見舞い", "オミマイ", ReadingMode::Hiragana),
        ("取り扱い", "トリアツカイ", ReadingMode::Hiragana),
        ("東京", "トウキョウ", ReadingMode::Katakana),
        ("ひらがな", "ヒラガナ", ReadingMode::Hiragana),
    ];
    let rendered = words
        .iter()
        .map(|(surface, reading, mode)| {
            format!("{} -> {}", surface, render_reading(surface, reading, *mode))
        })
        .collect::<Vec<_>>()
        .join("\n");
    insta::assert_snapshot!(rendered);
}
