//! Playwright integration for headless page capture.
//!
//! This module contains the inline capture script, error mapping,
//! and availability checks for Node.js and Playwright.

use crate::{ExtractError, Result};
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Capture script: renders the page and prints a `CapturedPage` JSON document.
///
/// Arguments: url, width, height, navigation timeout (ms), network idle
/// timeout (ms), headless flag.
pub(crate) const CAPTURE_SCRIPT: &str = r#"
const [, url, width, height, navTimeout, idleTimeout, headlessFlag] = process.argv;

async function run() {
  let browser;
  try {
    const { chromium } = require('playwright');
    browser = await chromium.launch({ headless: headlessFlag !== '0' });
    const context = await browser.newContext({
      viewport: {
        width: parseInt(width, 10),
        height: parseInt(height, 10)
      }
    });
    const page = await context.newPage();
    const navMs = parseInt(navTimeout, 10);
    const idleMs = parseInt(idleTimeout, 10);

    await page.goto(url, { waitUntil: 'networkidle', timeout: navMs });
    await page.waitForLoadState('networkidle', { timeout: idleMs });

    const capture = await page.evaluate(() => {
      const PROBE_TAGS = ['h1', 'h2', 'h3', 'h4', 'h5', 'h6'];

      function styleMap(style) {
        const out = {};
        for (let i = 0; i < style.length; i++) {
          const name = style[i];
          out[name] = style.getPropertyValue(name);
        }
        return out;
      }

      function declarations(style) {
        const out = [];
        for (let i = 0; i < style.length; i++) {
          const name = style[i];
          out.push({
            name,
            value: style.getPropertyValue(name),
            important: style.getPropertyPriority(name) === 'important'
          });
        }
        return out;
      }

      function convertRules(list) {
        const out = [];
        for (const rule of list) {
          if (rule instanceof CSSStyleRule) {
            out.push({
              type: 'style',
              selectorText: rule.selectorText,
              declarations: declarations(rule.style)
            });
          } else if (rule instanceof CSSMediaRule) {
            out.push({
              type: 'media',
              conditionText: rule.conditionText || rule.media.mediaText,
              rules: convertRules(rule.cssRules)
            });
          } else if (rule instanceof CSSKeyframesRule) {
            const keyframes = [];
            for (const frame of rule.cssRules) {
              keyframes.push({ keyText: frame.keyText, declarations: declarations(frame.style) });
            }
            out.push({ type: 'keyframes', name: rule.name, keyframes });
          } else {
            const text = rule.cssText || '';
            const match = /^@([\w-]+)/.exec(text);
            out.push({ type: 'other', atRule: match ? match[1].toLowerCase() : '' });
          }
        }
        return out;
      }

      const ids = new Map();
      const all = Array.from(document.querySelectorAll('*'));
      all.forEach((el, idx) => ids.set(el, idx));

      const elements = all.map((el) => {
        const attributes = {};
        for (const attr of el.attributes) {
          attributes[attr.name] = attr.value;
        }

        let text = null;
        for (const child of el.childNodes) {
          if (child.nodeType === Node.TEXT_NODE) {
            const trimmed = child.textContent.trim();
            if (trimmed) {
              text = text ? text + ' ' + trimmed : trimmed;
            }
          }
        }

        const box = el.getBoundingClientRect();
        const hasBox = el.getClientRects().length > 0;
        const before = window.getComputedStyle(el, '::before');
        const after = window.getComputedStyle(el, '::after');

        return {
          tag: el.tagName.toLowerCase(),
          attributes,
          parent: el.parentElement ? ids.get(el.parentElement) : null,
          children: Array.from(el.children).map((child) => ids.get(child)),
          text,
          inlineStyle: el.style ? declarations(el.style) : [],
          rect: hasBox ? { x: box.x, y: box.y, width: box.width, height: box.height } : null,
          style: styleMap(window.getComputedStyle(el)),
          before: before.length ? styleMap(before) : null,
          after: after.length ? styleMap(after) : null
        };
      });

      const defaultStyles = {};
      const tags = new Set(PROBE_TAGS);
      for (const el of all) {
        tags.add(el.tagName.toLowerCase());
      }
      const host = document.body || document.documentElement;
      for (const tag of tags) {
        const probe = document.createElement(tag);
        host.appendChild(probe);
        defaultStyles[tag] = styleMap(window.getComputedStyle(probe));
        probe.remove();
      }

      const stylesheets = [];
      for (const sheet of document.styleSheets) {
        const href = sheet.href || null;
        try {
          stylesheets.push({ href, rules: convertRules(sheet.cssRules) });
        } catch (err) {
          const accessError = err && err.name ? err.name : String(err);
          stylesheets.push({ href, accessError });
        }
      }

      return {
        version: '1',
        url: window.location.href,
        title: document.title,
        userAgent: navigator.userAgent,
        viewport: { width: window.innerWidth, height: window.innerHeight },
        documentSize: {
          width: document.documentElement.scrollWidth,
          height: document.documentElement.scrollHeight
        },
        root: ids.has(document.documentElement) ? ids.get(document.documentElement) : null,
        elements,
        defaultStyles,
        stylesheets
      };
    });

    console.log(JSON.stringify({ status: 'ok', capture }));
  } catch (err) {
    const message = err && err.message ? err.message : String(err);
    console.error(JSON.stringify({ status: 'error', message }));
    process.exitCode = 1;
  } finally {
    if (browser) {
      await browser.close();
    }
  }
}

run();
"#;

/// Timeout for checking node/playwright availability.
pub(crate) const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const PLAYWRIGHT_CHECK_SCRIPT: &str = "require('playwright'); process.stdout.write('ok');";

#[derive(Debug, serde::Deserialize)]
pub(crate) struct ScriptError {
    pub status: String,
    pub message: String,
}

pub(crate) fn map_spawn_error(err: io::Error, command: &str) -> ExtractError {
    if err.kind() == io::ErrorKind::NotFound {
        ExtractError::capture(format!(
            "Unable to spawn Playwright helper; '{}' was not found on PATH",
            command
        ))
    } else {
        ExtractError::Io(err)
    }
}

pub(crate) fn map_playwright_error(status_text: impl Into<String>, stderr: &str) -> ExtractError {
    if let Ok(error) = serde_json::from_str::<ScriptError>(stderr.trim()) {
        return map_playwright_status_error(&error.status, error.message);
    }

    let lower = stderr.to_ascii_lowercase();
    if lower.contains("cannot find module 'playwright'") {
        return missing_playwright();
    }

    if lower.contains("timeout") {
        return ExtractError::capture(
            "Playwright timed out; try increasing --nav-timeout/--network-idle-timeout or --process-timeout",
        );
    }

    ExtractError::capture(format!(
        "Playwright exited with status {}: {}",
        status_text.into(),
        stderr.trim()
    ))
}

pub(crate) fn map_playwright_status_error(status: &str, message: String) -> ExtractError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("cannot find module 'playwright'") {
        missing_playwright()
    } else if lower.contains("timeout") {
        ExtractError::capture(format!(
            "Playwright error (status {}): {}. Hint: increase --nav-timeout/--network-idle-timeout or --process-timeout",
            status, message
        ))
    } else {
        ExtractError::capture(format!("Playwright error (status {}): {}", status, message))
    }
}

fn missing_playwright() -> ExtractError {
    ExtractError::capture(
        "Playwright npm package is missing; install with `npm install playwright`.",
    )
}

pub(crate) async fn ensure_node_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let status = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.status())
        .await
        .map_err(|_| {
            ExtractError::capture(format!(
                "Timed out checking node availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !status.success() {
        return Err(ExtractError::capture(format!(
            "Node command {:?} is not available (exit {})",
            node_command, status
        )));
    }

    Ok(())
}

pub(crate) async fn ensure_playwright_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(PLAYWRIGHT_CHECK_SCRIPT)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            ExtractError::capture(format!(
                "Timed out checking Playwright availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(map_playwright_error(format!("{:?}", output.status), &stderr));
    }

    Ok(())
}
