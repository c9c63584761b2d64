//! In-page script builders for the DOM-fallback strategy.
//!
//! Every builder returns a self-contained expression evaluated in page
//! context. Elements resolve through one locator accepting either a
//! structural (CSS) selector or a path-query (XPath) selector; anything
//! starting with `/` or `(` is treated as XPath.
//!
//! Scripts throw on missing elements; the executor maps page exceptions to
//! execution errors.

use serde_json::Value;

use crate::protocol::UploadFile;

// ============================================================================
// Locator
// ============================================================================

/// Shared locator helper, prepended to every element script.
const LOCATOR: &str = r"
const __locate = (sel) => {
    if (sel.startsWith('/') || sel.startsWith('(')) {
        return document.evaluate(sel, document, null,
            XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    }
    return document.querySelector(sel);
};
const __require = (sel) => {
    const el = __locate(sel);
    if (!el) throw new Error('element not found: ' + sel);
    return el;
};
";

/// Encodes a Rust string as a JS string literal.
fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn with_locator(body: &str) -> String {
    format!("(() => {{{LOCATOR}\n{body}}})()")
}

// ============================================================================
// Evaluation
// ============================================================================

/// Wraps a caller expression in an isolating invocation so the entrypoint
/// cannot change the enclosing scope.
#[must_use]
pub fn wrap_expression(expression: &str) -> String {
    format!("(function() {{ \"use strict\"; return ({expression}); }})()")
}

// ============================================================================
// Element scripts
// ============================================================================

/// Resolves a selector to its center point, scrolling it into view.
///
/// Evaluates to `{x, y}` or `null` when the element is missing.
#[must_use]
pub fn center_point(selector: &str) -> String {
    let sel = js_string(selector);
    with_locator(&format!(
        "const el = __locate({sel});
        if (!el) return null;
        el.scrollIntoView({{block: 'center', inline: 'center'}});
        const r = el.getBoundingClientRect();
        return {{x: r.left + r.width / 2, y: r.top + r.height / 2}};"
    ))
}

/// Dispatches a standard click event sequence on an element.
#[must_use]
pub fn click(selector: &str) -> String {
    let sel = js_string(selector);
    with_locator(&format!(
        "const el = __require({sel});
        el.scrollIntoView({{block: 'center'}});
        for (const type of ['mousedown', 'mouseup', 'click']) {{
            el.dispatchEvent(new MouseEvent(type, {{bubbles: true, cancelable: true, view: window}}));
        }}
        return true;"
    ))
}

/// Types into an element with standard input/change events.
///
/// Value-bearing fields set `value`; contenteditable targets set
/// `textContent` (content reset, not value reset). Dispatches `input` and
/// `change` exactly once each.
#[must_use]
pub fn type_text(selector: &str, text: &str, clear: bool, append: bool) -> String {
    let sel = js_string(selector);
    let txt = js_string(text);
    with_locator(&format!(
        "const el = __require({sel});
        el.focus();
        const clear = {clear};
        const append = {append};
        if (el.isContentEditable) {{
            if (clear && !append) el.textContent = '';
            el.textContent = append ? el.textContent + {txt} : {txt};
        }} else {{
            if (clear && !append) el.value = '';
            el.value = append ? el.value + {txt} : {txt};
        }}
        el.dispatchEvent(new Event('input', {{bubbles: true}}));
        el.dispatchEvent(new Event('change', {{bubbles: true}}));
        return true;"
    ))
}

/// Focuses an element and optionally clears it, for the native typing path.
///
/// Contenteditable targets are cleared via content reset rather than value
/// reset.
#[must_use]
pub fn focus_and_clear(selector: &str, clear: bool) -> String {
    let sel = js_string(selector);
    with_locator(&format!(
        "const el = __require({sel});
        el.focus();
        if ({clear}) {{
            if (el.isContentEditable) el.textContent = '';
            else el.value = '';
        }}
        return true;"
    ))
}

/// Scrolls an element, or the window when no selector is given.
#[must_use]
pub fn scroll(selector: Option<&str>, dx: f64, dy: f64) -> String {
    match selector {
        Some(selector) => {
            let sel = js_string(selector);
            with_locator(&format!(
                "const el = __require({sel});
                el.scrollBy({dx}, {dy});
                return {{x: el.scrollLeft, y: el.scrollTop}};"
            ))
        }
        None => format!(
            "(() => {{ window.scrollBy({dx}, {dy}); \
             return {{x: window.scrollX, y: window.scrollY}}; }})()"
        ),
    }
}

/// Reads an element's text content.
#[must_use]
pub fn get_text(selector: &str) -> String {
    let sel = js_string(selector);
    with_locator(&format!("return __require({sel}).textContent;"))
}

/// Reads an element's outer HTML, or the whole document without a selector.
#[must_use]
pub fn get_html(selector: Option<&str>) -> String {
    match selector {
        Some(selector) => {
            let sel = js_string(selector);
            with_locator(&format!("return __require({sel}).outerHTML;"))
        }
        None => "document.documentElement.outerHTML".to_string(),
    }
}

/// Reads an element attribute (evaluates to the value or `null`).
#[must_use]
pub fn get_attribute(selector: &str, name: &str) -> String {
    let sel = js_string(selector);
    let attr = js_string(name);
    with_locator(&format!("return __require({sel}).getAttribute({attr});"))
}

/// Evaluates to `true` when the selector currently matches.
#[must_use]
pub fn exists(selector: &str) -> String {
    let sel = js_string(selector);
    with_locator(&format!("return __locate({sel}) !== null;"))
}

/// Replaces inner HTML of an element, or the body without a selector.
#[must_use]
pub fn set_html(selector: Option<&str>, html: &str) -> String {
    let content = js_string(html);
    match selector {
        Some(selector) => {
            let sel = js_string(selector);
            with_locator(&format!(
                "__require({sel}).innerHTML = {content}; return true;"
            ))
        }
        None => format!("(() => {{ document.body.innerHTML = {content}; return true; }})()"),
    }
}

/// Describes the first matching element.
#[must_use]
pub fn describe_element(selector: &str) -> String {
    let sel = js_string(selector);
    with_locator(&format!(
        "const el = __require({sel});
        return {DESCRIBE}(el);"
    ))
}

/// Describes all matching elements (structural selectors only for lists).
#[must_use]
pub fn describe_elements(selector: &str) -> String {
    let sel = js_string(selector);
    with_locator(&format!(
        "const sel = {sel};
        let els;
        if (sel.startsWith('/') || sel.startsWith('(')) {{
            els = [];
            const it = document.evaluate(sel, document, null,
                XPathResult.ORDERED_NODE_ITERATOR_TYPE, null);
            let node;
            while ((node = it.iterateNext())) els.push(node);
        }} else {{
            els = Array.from(document.querySelectorAll(sel));
        }}
        return els.map({DESCRIBE});"
    ))
}

/// Element descriptor shared by get-element(s).
const DESCRIBE: &str = "((el) => ({
        tag: el.tagName.toLowerCase(),
        id: el.id || null,
        classes: el.className || null,
        text: (el.textContent || '').trim().slice(0, 200)
    }))";

/// Populates a file input from inline payloads via a `DataTransfer`.
///
/// # Errors
///
/// Returns [`serde_json::Error`] if the payload list cannot be serialized.
pub fn upload(selector: &str, files: &[UploadFile]) -> Result<String, serde_json::Error> {
    let sel = js_string(selector);
    let payloads = serde_json::to_string(files)?;
    Ok(with_locator(&format!(
        "const el = __require({sel});
        const dt = new DataTransfer();
        for (const f of {payloads}) {{
            const bytes = Uint8Array.from(atob(f.data), (c) => c.charCodeAt(0));
            dt.items.add(new File([bytes], f.name, {{type: f.mime}}));
        }}
        el.files = dt.files;
        el.dispatchEvent(new Event('input', {{bubbles: true}}));
        el.dispatchEvent(new Event('change', {{bubbles: true}}));
        return el.files.length;"
    )))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("a\"b"), r#""a\"b""#);
        assert_eq!(js_string("line\nbreak"), r#""line\nbreak""#);
    }

    #[test]
    fn test_wrap_expression_isolates() {
        let wrapped = wrap_expression("document.title");
        assert!(wrapped.starts_with("(function()"));
        assert!(wrapped.contains("use strict"));
        assert!(wrapped.contains("return (document.title)"));
    }

    #[test]
    fn test_center_point_scrolls_into_view() {
        let script = center_point("#submit");
        assert!(script.contains("scrollIntoView"));
        assert!(script.contains(r##""#submit""##));
        assert!(script.contains("return null"));
    }

    #[test]
    fn test_xpath_detected_by_prefix() {
        let script = exists("//button[@type='submit']");
        assert!(script.contains("document.evaluate"));
    }

    #[test]
    fn test_type_text_distinguishes_contenteditable() {
        let script = type_text("#editor", "hello", true, false);
        assert!(script.contains("isContentEditable"));
        assert!(script.contains("textContent = ''"));
        assert!(script.contains("value = ''"));
        // input/change dispatched once each, outside the branches.
        assert_eq!(script.matches("new Event('input'").count(), 1);
        assert_eq!(script.matches("new Event('change'").count(), 1);
    }

    #[test]
    fn test_scroll_window_without_selector() {
        let script = scroll(None, 0.0, 400.0);
        assert!(script.contains("window.scrollBy(0, 400)"));
    }

    #[test]
    fn test_set_html_targets_body_by_default() {
        let script = set_html(None, "<p>hi</p>");
        assert!(script.contains("document.body.innerHTML"));
    }

    #[test]
    fn test_upload_embeds_payloads() {
        let files = vec![UploadFile {
            name: "a.txt".to_string(),
            mime: "text/plain".to_string(),
            data: "aGVsbG8=".to_string(),
        }];
        let script = upload("input[type=file]", &files).expect("serialize");
        assert!(script.contains("DataTransfer"));
        assert!(script.contains("aGVsbG8="));
        assert!(script.contains("atob"));
    }

    #[test]
    fn test_selector_injection_is_escaped() {
        let script = get_text("a\"); alert(1); (\"");
        // The malicious selector stays inside one string literal.
        assert!(script.contains(r#""a\"); alert(1); (\"""#));
    }
}
