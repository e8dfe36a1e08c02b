/// Escape message text for display and keep line breaks.
///
/// `<` and `>` must never survive as markup; `&` is escaped first so that
/// entity-looking input stays literal.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => out.push_str("<br>"),
            other => out.push(other),
        }
    }

    out
}
