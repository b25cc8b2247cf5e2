//! Python source synthesis.
//!
//! The interpreter's only input is program text, so every value reaches it
//! through one of two steps: [`escape_python_string`] for text placed inside
//! a double-quoted literal, or [`encode_base64_chunked`] for binary payloads.
//! Templates use `${name}` substitution points and never see raw user text.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use qraft_core::OutputKind;

/// First line of the package-install program.
pub const INSTALL_HEADER: &str = "# qraft: install packages";

/// Bytes encoded per base64 step. A multiple of 3 so chunks concatenate
/// without inner padding.
pub const BASE64_CHUNK_SIZE: usize = 3 * 1024;

const PLAIN_TEMPLATE: &str = r##"import base64
import io
import time

import segno

content = "${content}"
kind = "${kind}"

qr = segno.make(content, error="h")

output = io.BytesIO()
qr.save(out=output, kind=kind, scale=${scale})

output.seek(0)
image_b64 = base64.b64encode(output.getvalue()).decode("utf-8")

media_type = "image/png"
if kind in ("jpg", "jpeg"):
    media_type = "image/jpeg"
elif kind == "gif":
    media_type = "image/gif"

timestamp = int(time.time() * 1000)
data_url = "data:" + media_type + ";base64," + image_b64 + "#t=" + str(timestamp)

{
    "url": data_url,
    "content": content,
    "description": "QR code in ${label} format",
}
"##;

const ARTISTIC_TEMPLATE: &str = r##"import base64
import io
import time

import segno
import qrcode_artistic

content = "${content}"
kind = "${kind}"

qr = segno.make(content, error="h")

background = io.BytesIO(base64.b64decode("${background}"))

output = io.BytesIO()
qr.to_artistic(background=background, target=output, scale=${scale}, kind=kind)

output.seek(0)
image_b64 = base64.b64encode(output.getvalue()).decode("utf-8")

media_type = "image/png"
if kind in ("jpg", "jpeg"):
    media_type = "image/jpeg"
elif kind == "gif":
    media_type = "image/gif"

timestamp = int(time.time() * 1000)
data_url = "data:" + media_type + ";base64," + image_b64 + "#t=" + str(timestamp)

{
    "url": data_url,
    "content": content,
    "description": "QR code with uploaded image in ${label} format",
}
"##;

/// Inputs for one generation program.
#[derive(Debug, Clone, Copy)]
pub struct ProgramParams<'a> {
    pub content: &'a str,
    pub scale: u32,
    pub kind: OutputKind,
    pub background: Option<&'a [u8]>,
}

/// Escape text for a double-quoted Python string literal.
pub fn escape_python_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Base64-encode `bytes` one [`BASE64_CHUNK_SIZE`] slice at a time.
pub fn encode_base64_chunked(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(BASE64_CHUNK_SIZE) {
        STANDARD.encode_string(chunk, &mut encoded);
    }
    encoded
}

/// Build the generation program. Picks the artistic template when a
/// background image is present.
pub fn render(params: &ProgramParams<'_>) -> String {
    let content = escape_python_string(params.content);
    let kind = escape_python_string(params.kind.as_str());
    let scale = params.scale.to_string();

    match params.background {
        Some(background) => {
            let background = encode_base64_chunked(background);
            fill(
                ARTISTIC_TEMPLATE,
                &[
                    ("content", content.as_str()),
                    ("kind", kind.as_str()),
                    ("scale", scale.as_str()),
                    ("label", params.kind.label()),
                    ("background", background.as_str()),
                ],
            )
        }
        None => fill(
            PLAIN_TEMPLATE,
            &[
                ("content", content.as_str()),
                ("kind", kind.as_str()),
                ("scale", scale.as_str()),
                ("label", params.kind.label()),
            ],
        ),
    }
}

/// Program that installs pure packages with the interpreter's own installer.
pub fn install_program(packages: &[String]) -> String {
    let specs = packages
        .iter()
        .map(|p| format!("\"{}\"", escape_python_string(p)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"{INSTALL_HEADER}
import subprocess
import sys

packages = [{specs}]
if packages:
    subprocess.check_call(
        [sys.executable, "-m", "pip", "install", "--quiet", "--disable-pip-version-check", *packages]
    )
print("Python packages installed successfully")
"#
    )
}

fn fill(template: &str, substitutions: &[(&str, &str)]) -> String {
    // Single pass: substituted values are never rescanned for placeholders.
    let mut program = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        program.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after.find('}').and_then(|end| {
            let name = &after[..end];
            substitutions
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, value)| (*value, end))
        });
        match value {
            Some((value, end)) => {
                program.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                program.push_str("${");
                rest = after;
            }
        }
    }
    program.push_str(rest);
    program
}
