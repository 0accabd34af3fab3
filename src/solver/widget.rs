//! Challenge widget interactions
//!
//! DOM sequences shared by the orchestrator and both strategies: locating
//! the widget, clicking the anchor checkbox, extracting the proof token,
//! detecting the challenge surface, and intercepting programmatic-completion
//! callbacks. Everything goes through the session capability set; selectors
//! follow the widget's stable element ids.

use crate::browser::Session;
use crate::error::Result;
use serde_json::Value;
use std::time::Duration;

/// Anchor (checkbox) iframe
pub const ANCHOR_FRAME: &str =
    "iframe[src*='api2/anchor'], iframe[src*='enterprise/anchor'], iframe[title*='reCAPTCHA']";

/// Challenge popup iframe
pub const CHALLENGE_FRAME: &str =
    "iframe[src*='api2/bframe'], iframe[src*='enterprise/bframe']";

/// Switch-to-audio button inside the challenge surface
pub const AUDIO_BUTTON: &str = "#recaptcha-audio-button";
/// Audio clip element
pub const AUDIO_SOURCE: &str = "#audio-source";
/// Audio answer input
pub const AUDIO_RESPONSE: &str = "#audio-response";
/// Verify/submit button
pub const VERIFY_BUTTON: &str = "#recaptcha-verify-button";
/// New-challenge (reload) button
pub const RELOAD_BUTTON: &str = "#recaptcha-reload-button";
/// Image grid tiles
pub const IMAGE_TILE: &str = ".rc-imageselect-tile";

/// JS-side slot the capture hook writes intercepted tokens into
const TOKEN_SLOT: &str = "__gpCapturedToken";

/// Wait for the widget anchor to appear.
pub async fn wait_for_widget(session: &Session, timeout: Duration) -> Result<bool> {
    session.wait_for(ANCHOR_FRAME, timeout).await
}

/// Click the anchor checkbox (normal variant trigger).
pub async fn click_checkbox(session: &Session) -> Result<bool> {
    if !session.exists(ANCHOR_FRAME).await? {
        return Ok(false);
    }
    session.click(ANCHOR_FRAME).await?;
    Ok(true)
}

/// Whether the anchor reports the solved (checked) state.
pub async fn is_checked(session: &Session) -> Result<bool> {
    let script = r#"
        (() => {
            const anchor = document.querySelector('#recaptcha-anchor');
            if (anchor && anchor.classList.contains('recaptcha-checkbox-checked')) {
                return true;
            }
            const frames = document.querySelectorAll("iframe[src*='anchor']");
            for (const f of frames) {
                if (f.getAttribute('data-gp-checked') === 'true') return true;
            }
            return false;
        })()
    "#;
    Ok(session.evaluate(script).await?.as_bool().unwrap_or(false))
}

/// Pull the proof token out of the page, trying the response textarea, the
/// hidden input, and the widget API in that order.
pub async fn extract_token(session: &Session) -> Result<Option<String>> {
    let script = r#"
        (() => {
            const textarea = document.querySelector('textarea[name="g-recaptcha-response"]');
            if (textarea && textarea.value) return textarea.value;

            const input = document.querySelector('input[name="g-recaptcha-response"]');
            if (input && input.value) return input.value;

            const candidates = document.querySelectorAll('textarea[id*="g-recaptcha-response"]');
            for (const ta of candidates) {
                if (ta.value) return ta.value;
            }

            try {
                if (typeof grecaptcha !== 'undefined' && grecaptcha.getResponse) {
                    const r = grecaptcha.getResponse();
                    if (r) return r;
                }
            } catch (e) {}
            try {
                if (typeof grecaptcha !== 'undefined' && grecaptcha.enterprise) {
                    const r = grecaptcha.enterprise.getResponse();
                    if (r) return r;
                }
            } catch (e) {}

            return null;
        })()
    "#;
    Ok(as_string(session.evaluate(script).await?))
}

/// Wait for the challenge surface to pop up.
pub async fn wait_for_challenge(session: &Session, timeout: Duration) -> Result<bool> {
    session.wait_for(CHALLENGE_FRAME, timeout).await
}

/// Whether the provider is refusing further challenges of this kind.
pub async fn is_rate_limited(session: &Session) -> Result<bool> {
    let script = r#"
        (() => {
            const el = document.querySelector('.rc-doscaptcha-header-text');
            return !!(el && el.textContent.toLowerCase().includes('try again later'));
        })()
    "#;
    Ok(session.evaluate(script).await?.as_bool().unwrap_or(false))
}

/// Install the token capture hook: wraps the widget's programmatic execute
/// path so completion callbacks land in a page-side slot we can poll.
/// Retries installation until the widget script has loaded.
pub async fn install_token_capture(session: &Session, enterprise: bool) -> Result<()> {
    let api = if enterprise {
        "window.grecaptcha && window.grecaptcha.enterprise"
    } else {
        "window.grecaptcha"
    };
    let target = if enterprise {
        "window.grecaptcha.enterprise"
    } else {
        "window.grecaptcha"
    };
    let script = format!(
        r#"
        (() => {{
            window.{slot} = window.{slot} || null;
            const hook = setInterval(() => {{
                if ({api} && {target}.execute && !{target}.__gpWrapped) {{
                    const original = {target}.execute;
                    {target}.execute = function(...args) {{
                        const p = original.apply(this, args);
                        if (p && p.then) {{
                            p.then(token => {{
                                if (token) window.{slot} = token;
                            }});
                        }}
                        return p;
                    }};
                    {target}.__gpWrapped = true;
                    clearInterval(hook);
                }}
            }}, 100);
        }})()
        "#,
        slot = TOKEN_SLOT,
        api = api,
        target = target,
    );
    session.evaluate(&script).await?;
    Ok(())
}

/// Read the capture slot.
pub async fn captured_token(session: &Session) -> Result<Option<String>> {
    let script = format!("window.{} || null", TOKEN_SLOT);
    Ok(as_string(session.evaluate(&script).await?))
}

/// Fire the programmatic trigger (invisible/enterprise variants). Falls back
/// to clicking a submit control when the widget API is not reachable.
pub async fn trigger_execute(
    session: &Session,
    site_key: &str,
    action: Option<&str>,
    s_payload: Option<&str>,
    enterprise: bool,
) -> Result<bool> {
    let target = if enterprise {
        "grecaptcha.enterprise"
    } else {
        "grecaptcha"
    };
    let action = action.unwrap_or("submit");
    let s_field = s_payload
        .map(|s| format!(", s: '{}'", s.replace('\'', "\\'")))
        .unwrap_or_default();
    let script = format!(
        r#"
        (async () => {{
            try {{
                if (typeof grecaptcha !== 'undefined' && {target} && {target}.execute) {{
                    await {target}.execute('{site_key}', {{ action: '{action}'{s_field} }});
                    return true;
                }}
            }} catch (e) {{}}

            try {{
                const controls = document.querySelectorAll(
                    "button[type='submit'], input[type='submit'], .g-recaptcha"
                );
                for (const c of controls) {{
                    c.click();
                    return true;
                }}
            }} catch (e) {{}}

            return false;
        }})()
        "#,
        target = target,
        site_key = site_key.replace('\'', "\\'"),
        action = action.replace('\'', "\\'"),
        s_field = s_field,
    );
    Ok(session.evaluate(&script).await?.as_bool().unwrap_or(false))
}

/// Apply a cookie header to the page before triggering. Best effort;
/// HttpOnly cookies cannot be set from script.
pub async fn apply_cookies(session: &Session, cookie_header: &str) -> Result<()> {
    let cookies = serde_json::to_string(
        &cookie_header
            .split(';')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>(),
    )?;
    let script = format!(
        r#"
        (() => {{
            for (const c of {cookies}) {{
                document.cookie = c;
            }}
        }})()
        "#,
        cookies = cookies
    );
    session.evaluate(&script).await?;
    Ok(())
}

/// Read the challenge instruction label text, if a challenge is showing.
pub async fn challenge_instruction(session: &Session) -> Result<Option<String>> {
    let script = r#"
        (() => {
            const el = document.querySelector('.rc-imageselect-desc-wrapper')
                || document.querySelector('.rc-imageselect-desc');
            return el ? el.textContent.trim() : null;
        })()
    "#;
    Ok(as_string(session.evaluate(script).await?))
}

/// Collect the tile image sources as `(index, src)` pairs.
pub async fn tile_sources(session: &Session) -> Result<Vec<(usize, String)>> {
    let script = r#"
        (() => {
            const out = [];
            const tiles = document.querySelectorAll('.rc-imageselect-tile');
            tiles.forEach((tile, i) => {
                const img = tile.querySelector('img');
                if (img && img.src) out.push({ i: i, src: img.src });
            });
            return out;
        })()
    "#;
    let value = session.evaluate(script).await?;
    let mut sources = Vec::new();
    if let Value::Array(items) = value {
        for item in items {
            let idx = item.get("i").and_then(Value::as_u64);
            let src = item.get("src").and_then(Value::as_str);
            if let (Some(idx), Some(src)) = (idx, src) {
                sources.push((idx as usize, src.to_string()));
            }
        }
    }
    Ok(sources)
}

/// Click one tile by grid index.
pub async fn click_tile(session: &Session, index: usize) -> Result<()> {
    let script = format!(
        r#"
        (() => {{
            const tiles = document.querySelectorAll('.rc-imageselect-tile');
            if (tiles[{index}]) tiles[{index}].click();
        }})()
        "#,
        index = index
    );
    session.evaluate(&script).await?;
    Ok(())
}

/// Click the verify button if present.
pub async fn click_verify(session: &Session) -> Result<()> {
    if session.exists(VERIFY_BUTTON).await? {
        session.click(VERIFY_BUTTON).await?;
    }
    Ok(())
}

/// Click the reload button for fresh challenge content.
pub async fn click_reload(session: &Session) -> Result<()> {
    if session.exists(RELOAD_BUTTON).await? {
        session.click(RELOAD_BUTTON).await?;
    }
    Ok(())
}

fn as_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}
