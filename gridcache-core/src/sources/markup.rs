//! Minimal tag slicing for the vendor XML and HTML payloads.
//!
//! Not a general parser: enough to pull named elements, attributes and text
//! out of the publication services' well-formed output. Element names are
//! matched case-insensitively on their local name (namespace prefix ignored);
//! nested elements of the same name are balanced.

#[derive(Debug, Clone, Copy)]
struct Tag<'a> {
    name: &'a str,
    attrs: &'a str,
    closing: bool,
    self_closing: bool,
    /// Byte offset just past the closing `>`.
    end: usize,
}

/// A matched element.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Element<'a> {
    pub attrs: &'a str,
    /// Content between the start and end tags; `None` for `<x/>`.
    pub inner: Option<&'a str>,
    end: usize,
}

impl<'a> Element<'a> {
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        attr(self.attrs, name)
    }

    /// Text of the element, tags stripped, whitespace collapsed.
    pub fn text(&self) -> String {
        self.inner.map(text_content).unwrap_or_default()
    }
}

fn local_name(qualified: &str) -> &str {
    match qualified.rfind(':') {
        Some(i) => &qualified[i + 1..],
        None => qualified,
    }
}

fn read_tag(doc: &str, lt: usize) -> Option<Tag<'_>> {
    let rest = &doc[lt + 1..];
    let gt = rest.find('>')?;
    let body = &rest[..gt];
    let (closing, body) = match body.strip_prefix('/') {
        Some(b) => (true, b),
        None => (false, body),
    };
    let self_closing = body.ends_with('/');
    let body = body.trim_end_matches('/');
    let name_end = body.find(char::is_whitespace).unwrap_or(body.len());
    Some(Tag {
        name: &body[..name_end],
        attrs: body[name_end..].trim(),
        closing,
        self_closing,
        end: lt + 1 + gt + 1,
    })
}

/// Next real tag at or after `from`, skipping comments, declarations and processing instructions.
fn next_tag(doc: &str, from: usize) -> Option<(usize, Tag<'_>)> {
    let mut pos = from;
    loop {
        let lt = pos + doc.get(pos..)?.find('<')?;
        let rest = &doc[lt..];
        if rest.starts_with("<!--") {
            pos = lt + 4 + rest[4..].find("-->")? + 3;
            continue;
        }
        let tag = read_tag(doc, lt)?;
        if tag.name.is_empty() || tag.name.starts_with('!') || tag.name.starts_with('?') {
            pos = tag.end;
            continue;
        }
        return Some((lt, tag));
    }
}

fn next_element<'a>(doc: &'a str, name: &str, from: usize) -> Option<Element<'a>> {
    let mut pos = from;
    loop {
        let (_, open) = next_tag(doc, pos)?;
        pos = open.end;
        if open.closing || !local_name(open.name).eq_ignore_ascii_case(name) {
            continue;
        }
        if open.self_closing {
            return Some(Element {
                attrs: open.attrs,
                inner: None,
                end: open.end,
            });
        }

        let mut depth = 1usize;
        let mut scan = open.end;
        loop {
            let (lt, tag) = next_tag(doc, scan)?;
            scan = tag.end;
            if !tag.name.eq_ignore_ascii_case(open.name) {
                continue;
            }
            if tag.closing {
                depth -= 1;
                if depth == 0 {
                    return Some(Element {
                        attrs: open.attrs,
                        inner: Some(&doc[open.end..lt]),
                        end: tag.end,
                    });
                }
            } else if !tag.self_closing {
                depth += 1;
            }
        }
    }
}

/// All top-level `name` elements in `doc`, in document order.
pub(crate) fn elements<'a>(doc: &'a str, name: &str) -> Vec<Element<'a>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(el) = next_element(doc, name, pos) {
        pos = el.end;
        out.push(el);
    }
    out
}

pub(crate) fn first_element<'a>(doc: &'a str, name: &str) -> Option<Element<'a>> {
    next_element(doc, name, 0)
}

/// Value of attribute `name` in a raw attribute string.
pub(crate) fn attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = attrs;
    loop {
        let eq = rest.find('=')?;
        let key = rest[..eq].trim().rsplit(char::is_whitespace).next().unwrap_or("");
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next()?;
        let (value, remaining) = if quote == '"' || quote == '\'' {
            let close = after[1..].find(quote)?;
            (&after[1..1 + close], &after[close + 2..])
        } else {
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            (&after[..end], &after[end..])
        };
        if key.eq_ignore_ascii_case(name) {
            return Some(value);
        }
        rest = remaining;
    }
}

/// First non-blank text node in a fragment, trimmed.
pub(crate) fn first_text(fragment: &str) -> Option<&str> {
    let mut pos = 0;
    loop {
        let next_lt = fragment[pos..]
            .find('<')
            .map_or(fragment.len(), |i| pos + i);
        let text = fragment[pos..next_lt].trim();
        if !text.is_empty() {
            return Some(text);
        }
        if next_lt >= fragment.len() {
            return None;
        }
        pos = next_lt + fragment[next_lt..].find('>')? + 1;
    }
}

/// Text with tags removed, common entities decoded and whitespace collapsed.
pub(crate) fn text_content(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&euro;", "€")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_prefixed_and_self_closing_elements() {
        let doc = r#"<r xmlns:i="x"><a:Item><V>1</V></a:Item><a:Item><V i:nil="true"/></a:Item></r>"#;
        let items = elements(doc, "item");
        assert_eq!(items.len(), 2);
        assert_eq!(first_element(items[0].inner.unwrap(), "V").unwrap().text(), "1");
        let nil = first_element(items[1].inner.unwrap(), "V").unwrap();
        assert!(nil.inner.is_none());
        assert_eq!(nil.attr("i:nil"), Some("true"));
    }

    #[test]
    fn balances_nested_elements() {
        let doc = "<table id='outer'><tr><td><table><tr><td>x</td></tr></table></td></tr><tr><td>y</td></tr></table>";
        let outer = first_element(doc, "table").unwrap();
        assert_eq!(outer.attr("id"), Some("outer"));
        let rows = elements(outer.inner.unwrap(), "tr");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].text(), "y");
    }

    #[test]
    fn attr_handles_boolean_and_unquoted() {
        assert_eq!(attr(r#"nowrap id=grid class="a b""#, "id"), Some("grid"));
        assert_eq!(attr(r#"nowrap id=grid class="a b""#, "class"), Some("a b"));
        assert_eq!(attr("nowrap", "id"), None);
    }

    #[test]
    fn first_text_skips_markup() {
        assert_eq!(
            first_text("\n  <b:DateTime>2018-03-01T00:00:00Z</b:DateTime><b:Offset>60</b:Offset>"),
            Some("2018-03-01T00:00:00Z")
        );
        assert_eq!(first_text("<a/>  <b></b>"), None);
    }

    #[test]
    fn text_content_decodes_entities() {
        assert_eq!(text_content("<span>&euro;&nbsp;1.234,56</span>\n"), "€ 1.234,56");
    }

    #[test]
    fn comments_are_ignored() {
        let doc = "<!-- <V>9</V> --><V>3</V>";
        assert_eq!(first_element(doc, "v").unwrap().text(), "3");
    }
}
