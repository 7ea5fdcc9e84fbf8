// page.rs
/// What the engine hands to the view after a load.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone)]
enum Token {
    Text(String),
    Tag(String),
}

fn tokenize_html(body: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current_text = String::new();
    let mut in_tag = false;

    for c in body.chars() {
        match c {
            '<' => {
                if !current_text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut current_text)));
                }
                in_tag = true;
            }
            '>' if in_tag => {
                let tag = current_text.trim().to_lowercase();
                if !tag.is_empty() {
                    tokens.push(Token::Tag(tag));
                }
                current_text.clear();
                in_tag = false;
            }
            _ => current_text.push(c),
        }
    }

    if !in_tag && !current_text.is_empty() {
        tokens.push(Token::Text(current_text));
    }
    tokens
}

/// Tag name without attributes or the closing slash.
fn tag_name(tag: &str) -> &str {
    let tag = tag.trim_start_matches('/');
    tag.split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or("")
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "br"
            | "li"
            | "tr"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "hr"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "table"
            | "ul"
            | "ol"
            | "pre"
            | "blockquote"
    )
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Page {
    pub fn from_html(url: &str, body: &str) -> Self {
        let mut title = String::new();
        let mut lines: Vec<String> = Vec::new();
        let mut line = String::new();
        let mut skipping: Option<&str> = None;
        let mut in_title = false;

        for token in tokenize_html(body) {
            match token {
                Token::Tag(tag) => {
                    let closing = tag.starts_with('/');
                    let name = tag_name(&tag);
                    if let Some(skipped) = skipping {
                        if closing && name == skipped {
                            skipping = None;
                        }
                        continue;
                    }
                    match name {
                        "script" | "style" if !closing => {
                            skipping = Some(if name == "script" { "script" } else { "style" })
                        }
                        "title" => in_title = !closing,
                        name if is_block(name) => {
                            if !line.trim().is_empty() {
                                lines.push(collapse_whitespace(&line));
                            }
                            line.clear();
                        }
                        _ => {}
                    }
                }
                Token::Text(text) => {
                    if skipping.is_some() {
                        continue;
                    }
                    let text = html_escape::decode_html_entities(&text);
                    if in_title {
                        title.push_str(&text);
                    } else {
                        line.push_str(&text);
                        line.push(' ');
                    }
                }
            }
        }
        if !line.trim().is_empty() {
            lines.push(collapse_whitespace(&line));
        }

        Page {
            url: url.to_string(),
            title: collapse_whitespace(&title),
            text: lines.join("\n"),
        }
    }

    pub fn from_plain_text(url: &str, body: &str) -> Self {
        Page {
            url: url.to_string(),
            title: String::new(),
            text: body.to_string(),
        }
    }

    /// The engine's own error page for a failed navigation.
    pub fn error(url: &str, message: &str) -> Self {
        Page {
            url: url.to_string(),
            title: "Error".to_string(),
            text: format!("Failed to load {}: {}", url, message),
        }
    }

    /// Title if the document has one, the URL otherwise.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}
