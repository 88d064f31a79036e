use unicode_width::UnicodeWidthChar;

pub fn display_width(text: &str) -> usize {
    text.chars().map(char_width).sum()
}

pub fn char_width(ch: char) -> usize {
    let code = ch as u32;
    if code < 0x81 {
        return 1;
    }
    // half-width katakana
    if (0xFF61..0xFFA0).contains(&code) {
        return 1;
    }
    match ch {
        '\u{00B7}' | '\u{2011}' | '\u{2017}' => 1,
        _ => ch.width_cjk().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_single_column() {
        assert_eq!(display_width("hello.txt"), 9);
        assert_eq!(display_width(" "), 1);
    }

    #[test]
    fn cjk_and_box_drawing_are_double() {
        assert_eq!(display_width("日"), 2);
        assert_eq!(display_width("日本語"), 6);
        assert_eq!(display_width("┣"), 2);
        assert_eq!(display_width("┃ "), 3);
    }

    #[test]
    fn half_width_katakana_is_single() {
        assert_eq!(display_width("ｱｲｳ"), 3);
    }

    #[test]
    fn combining_marks_take_no_columns() {
        assert_eq!(display_width("e\u{0301}"), 1);
        assert_eq!(display_width("a\u{200B}b"), 2);
    }

    #[test]
    fn narrow_exceptions() {
        assert_eq!(char_width('·'), 1);
        assert_eq!(char_width('\u{2011}'), 1);
    }

    #[test]
    fn neutral_scripts_and_emoji_follow_terminal_columns() {
        assert_eq!(display_width("שלום"), 4);
        assert_eq!(char_width('ب'), 1);
        assert_eq!(char_width('😀'), 2);
    }
}
