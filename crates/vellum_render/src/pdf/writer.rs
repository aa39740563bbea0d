//! PDF object table and file serialization

use std::fmt::Write as _;
use std::io::{self, Write};

use vellum_core::Affine;

/// Indirect object number
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjId(pub u32);

impl ObjId {
    /// `n 0 R`
    pub fn r(&self) -> String {
        format!("{} 0 R", self.0)
    }
}

/// Collects object bodies until the file is written
#[derive(Default)]
pub struct PdfWriter {
    objects: Vec<Option<Vec<u8>>>,
}

impl PdfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an object number to fill in later
    pub fn alloc(&mut self) -> ObjId {
        self.objects.push(None);
        ObjId(self.objects.len() as u32)
    }

    pub fn set(&mut self, id: ObjId, body: impl Into<Vec<u8>>) {
        if let Some(slot) = self.objects.get_mut(id.0 as usize - 1) {
            *slot = Some(body.into());
        }
    }

    pub fn add(&mut self, body: impl Into<Vec<u8>>) -> ObjId {
        let id = self.alloc();
        self.set(id, body);
        id
    }

    /// Stream object; `dict` holds the entries without `<<` `>>` or `/Length`
    pub fn add_stream(&mut self, dict: &str, data: &[u8]) -> ObjId {
        let id = self.alloc();
        self.set_stream(id, dict, data);
        id
    }

    pub fn set_stream(&mut self, id: ObjId, dict: &str, data: &[u8]) {
        let mut body = format!("<< {dict} /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.set(id, body);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Write header, objects, cross-reference table and trailer
    pub fn write<W: Write + ?Sized>(
        &self,
        out: &mut W,
        version: &str,
        root: ObjId,
        info: Option<ObjId>,
    ) -> io::Result<()> {
        let mut buf: Vec<u8> = Vec::new();
        buf.extend_from_slice(format!("%PDF-{version}\n").as_bytes());
        buf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        let mut offsets = Vec::with_capacity(self.objects.len());
        for (i, body) in self.objects.iter().enumerate() {
            offsets.push(buf.len());
            buf.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
            match body {
                Some(body) => buf.extend_from_slice(body),
                None => buf.extend_from_slice(b"null"),
            }
            buf.extend_from_slice(b"\nendobj\n");
        }

        let xref = buf.len();
        let mut table = format!("xref\n0 {}\n0000000000 65535 f \n", self.objects.len() + 1);
        for off in &offsets {
            let _ = write!(table, "{off:010} 00000 n \n");
        }
        buf.extend_from_slice(table.as_bytes());

        let mut trailer = format!("trailer\n<< /Size {} /Root {}", self.objects.len() + 1, root.r());
        if let Some(info) = info {
            let _ = write!(trailer, " /Info {}", info.r());
        }
        let _ = write!(trailer, " >>\nstartxref\n{xref}\n%%EOF\n");
        buf.extend_from_slice(trailer.as_bytes());

        out.write_all(&buf)?;
        out.flush()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Formatting
// ─────────────────────────────────────────────────────────────────────────────

/// Compact real number
pub fn num(v: f64) -> String {
    if !v.is_finite() {
        return "0".to_string();
    }
    if (v - v.round()).abs() < 1e-9 {
        return format!("{}", v.round() as i64);
    }
    let s = format!("{v:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// `a b c d e f`
pub fn matrix(m: &Affine) -> String {
    m.elements.iter().map(|v| num(*v)).collect::<Vec<_>>().join(" ")
}

/// `[a b ...]`
pub fn array(values: &[f64]) -> String {
    format!("[{}]", values.iter().map(|v| num(*v)).collect::<Vec<_>>().join(" "))
}

/// PDF literal string with escapes
pub fn text_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('(');
    for c in s.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out.push(')');
    out
}
