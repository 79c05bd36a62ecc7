//! Menu/text compiler and decoder (spec §4.8): tokenized menu-script lines compiled into
//! the tagged binary records that make up a "menu" file's payload, and the inverse
//! (`cat-menu`) that reproduces the original surface syntax.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::FbError;

/// Tag byte stored at offset 1 of every menu record.
///
/// Not part of the retrieved source (only the record *shapes* were recovered, not their
/// header file's tag constants); chosen to be internally consistent between the compiler
/// and decoder below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Tag {
    Menu = 1,
    Text = 2,
    Timeout = 3,
    Default = 4,
    Color = 5,
}

/// `sys_type` values for a `menu` record. Same grounding note as [`Tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SysType {
    Grldr = 1,
    Syslinux = 2,
    Msdos = 3,
    Freedos = 4,
    Chain = 5,
    Linux = 6,
}

impl SysType {
    fn from_kind(kind: &str) -> Option<Self> {
        Some(match kind {
            "grldr" => SysType::Grldr,
            "syslinux" => SysType::Syslinux,
            "msdos" => SysType::Msdos,
            "freedos" => SysType::Freedos,
            "chain" => SysType::Chain,
            "linux" => SysType::Linux,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            SysType::Grldr => "grldr",
            SysType::Syslinux => "syslinux",
            SysType::Msdos => "msdos",
            SysType::Freedos => "freedos",
            SysType::Chain => "chain",
            SysType::Linux => "linux",
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            1 => SysType::Grldr,
            2 => SysType::Syslinux,
            3 => SysType::Msdos,
            4 => SysType::Freedos,
            5 => SysType::Chain,
            6 => SysType::Linux,
            _ => return None,
        })
    }
}

/// Sentinel attr byte for `color normal`. Not documented by the retrieved source (the
/// real attribute byte space, `bg<<4|fg`, already spans 0..=255) — chosen as the
/// conventional grub4dos/syslinux "inherit terminal colors" value.
pub const COLOR_NORMAL: u8 = 0xFF;

const COLOR_NAMES: [&str; 16] = [
    "black",
    "blue",
    "green",
    "cyan",
    "red",
    "magenta",
    "brown",
    "light-gray",
    "dark-gray",
    "light-blue",
    "light-green",
    "light-cyan",
    "light-red",
    "light-magenta",
    "yellow",
    "white",
];

fn name_to_color(name: &str) -> Option<u8> {
    COLOR_NAMES.iter().position(|&n| n == name).map(|i| i as u8)
}

fn color_value(spec: &str) -> Result<u8, FbError> {
    if spec == "normal" {
        return Ok(COLOR_NORMAL);
    }
    let (fg_name, bg_name) = match spec.split_once('/') {
        Some((fg, bg)) => (fg, Some(bg)),
        None => (spec, None),
    };
    let fg = name_to_color(fg_name)
        .ok_or_else(|| FbError::InvalidMenu(format!("invalid foreground color {fg_name}")))?;
    let bg = match bg_name {
        Some(bg) => {
            name_to_color(bg).ok_or_else(|| FbError::InvalidMenu(format!("invalid background color {bg}")))?
        }
        None => 0,
    };
    Ok((bg << 4) | fg)
}

fn color_name(attr: u8) -> String {
    if attr == COLOR_NORMAL {
        return String::from("normal");
    }
    let fg = attr & 0xF;
    let bg = attr >> 4;
    if bg == 0 {
        COLOR_NAMES[fg as usize].to_string()
    } else {
        format!("{}/{}", COLOR_NAMES[fg as usize], COLOR_NAMES[bg as usize])
    }
}

/// Maps a hotkey token to the BIOS-keystroke-style 2-byte code stored in a `menu`
/// record: plain alphanumerics in the low byte (uppercased), function keys `F1`..`F12`
/// as a scan code in the high byte. Also not in the retrieved source; chosen to match
/// how BIOS `int 16h` keystrokes are conventionally split into (scan code, ASCII).
fn key_code(token: &str) -> Option<u16> {
    if let Some(rest) = token.strip_prefix('F').or_else(|| token.strip_prefix('f')) {
        let n: u8 = rest.parse().ok()?;
        if (1..=12).contains(&n) {
            let scan = 0x3Bu8 + (n - 1);
            return Some((scan as u16) << 8);
        }
        return None;
    }
    let mut chars = token.chars();
    let ch = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some(ch.to_ascii_uppercase() as u16)
}

fn key_name(code: u16) -> String {
    let high = (code >> 8) as u8;
    let low = (code & 0xFF) as u8;
    if low == 0 && high != 0 && (0x3B..=0x46).contains(&high) {
        format!("F{}", high - 0x3B + 1)
    } else {
        (low as char).to_string()
    }
}

/// Splits a menu-script line into whitespace-separated tokens, honoring `"..."` quoting,
/// matching the original's `parse_line`.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        let mut token = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                token.push(c);
            }
        } else {
            while matches!(chars.peek(), Some(c) if !c.is_whitespace()) {
                token.push(chars.next().unwrap());
            }
        }
        tokens.push(token);
    }
    tokens
}

fn encode_menu(tokens: &[String], out: &mut Vec<u8>) -> Result<(), FbError> {
    if tokens.len() < 2 {
        return Err(FbError::InvalidMenu(String::from("not enough parameters")));
    }
    let key = key_code(&tokens[0])
        .ok_or_else(|| FbError::InvalidMenu(format!("invalid hotkey {}", tokens[0])))?;
    let sys_type = SysType::from_kind(&tokens[1])
        .ok_or_else(|| FbError::InvalidMenu(format!("invalid system type {}", tokens[1])))?;

    let mut body = Vec::new();
    match sys_type {
        SysType::Linux => {
            if tokens.len() < 3 {
                return Err(FbError::InvalidMenu(String::from("not enough parameters")));
            }
            body.extend_from_slice(tokens[2].as_bytes());
            body.push(0);
            body.extend_from_slice(tokens.get(3).map(String::as_str).unwrap_or("").as_bytes());
            body.push(0);
            body.extend_from_slice(tokens.get(4).map(String::as_str).unwrap_or("").as_bytes());
            body.push(0);
        }
        _ => {
            if tokens.len() < 3 {
                return Err(FbError::InvalidMenu(String::from("not enough parameters")));
            }
            body.extend_from_slice(tokens[2].as_bytes());
            body.push(0);
        }
    }

    let total = 5 + body.len();
    let size = total
        .checked_sub(2)
        .and_then(|s| u8::try_from(s).ok())
        .ok_or_else(|| FbError::InvalidMenu(String::from("menu item too long")))?;
    out.push(size);
    out.push(Tag::Menu as u8);
    out.extend_from_slice(&key.to_le_bytes());
    out.push(sys_type as u8);
    out.extend_from_slice(&body);
    Ok(())
}

fn encode_text(tokens: &[String], out: &mut Vec<u8>) -> Result<(), FbError> {
    let (has_newline, words) = match tokens.first().map(String::as_str) {
        Some("-n") => (false, &tokens[1..]),
        _ => (true, tokens),
    };
    let mut title = words.join(" ");
    if has_newline {
        title.push_str("\r\n");
    }
    title.push('\0');

    let total = 2 + title.len();
    let size = total
        .checked_sub(2)
        .and_then(|s| u8::try_from(s).ok())
        .ok_or_else(|| FbError::InvalidMenu(String::from("text item too long")))?;
    out.push(size);
    out.push(Tag::Text as u8);
    out.extend_from_slice(title.as_bytes());
    Ok(())
}

fn encode_timeout(tokens: &[String], tag: Tag, out: &mut Vec<u8>) -> Result<(), FbError> {
    let value = tokens
        .first()
        .ok_or_else(|| FbError::InvalidMenu(String::from("not enough parameters")))?;
    let byte = match tag {
        Tag::Color => color_value(value)?,
        _ => value
            .parse::<u8>()
            .map_err(|_| FbError::InvalidMenu(format!("invalid value {value}")))?,
    };
    out.push(1); // len(3) - 2
    out.push(tag as u8);
    out.push(byte);
    Ok(())
}

/// Compiles menu-script source (one command per line, `#` starts a comment) into the
/// tagged binary blob described by spec §3, terminated with a zero byte.
pub fn compile(source: &str) -> Result<Vec<u8>, FbError> {
    let mut out = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens = tokenize(line);
        if tokens.is_empty() {
            continue;
        }
        let args = &tokens[1..];
        match tokens[0].as_str() {
            "menu" => encode_menu(args, &mut out)?,
            "text" => encode_text(args, &mut out)?,
            "timeout" => encode_timeout(args, Tag::Timeout, &mut out)?,
            "default" => encode_timeout(args, Tag::Default, &mut out)?,
            "color" => encode_timeout(args, Tag::Color, &mut out)?,
            other => return Err(FbError::InvalidMenu(format!("unknown command {other}"))),
        }
    }
    out.push(0);
    Ok(out)
}

/// Reverses [`compile`]: walks the tagged blob and reproduces one script line per
/// record.
pub fn decode(blob: &[u8]) -> Result<Vec<String>, FbError> {
    let mut lines = Vec::new();
    let mut ofs = 0usize;
    while ofs < blob.len() && blob[ofs] != 0 {
        let size = blob[ofs] as usize;
        let tag = blob[ofs + 1];
        let body = &blob[ofs + 2..];
        if tag == Tag::Menu as u8 {
            let key = u16::from_le_bytes([body[0], body[1]]);
            let sys_type = SysType::from_byte(body[2])
                .ok_or_else(|| FbError::InvalidMenu(format!("invalid system type {}", body[2])))?;
            let name_area = &body[3..];
            match sys_type {
                SysType::Linux => {
                    let (a, rest) = split_nul(name_area);
                    let (b, rest) = split_nul(rest);
                    let (c, _) = split_nul(rest);
                    lines.push(format!(
                        "menu {} linux \"{}\" \"{}\" \"{}\"",
                        key_name(key),
                        a,
                        b,
                        c
                    ));
                }
                other => {
                    let (name, _) = split_nul(name_area);
                    lines.push(format!("menu {} {} \"{}\"", key_name(key), other.name(), name));
                }
            }
        } else if tag == Tag::Text as u8 {
            let mut title = split_nul(body).0.to_string();
            let has_newline = title.ends_with("\r\n");
            if has_newline {
                title.truncate(title.len() - 2);
            }
            lines.push(format!(
                "text {}\"{}\"",
                if has_newline { "" } else { "-n " },
                title
            ));
        } else if tag == Tag::Timeout as u8 || tag == Tag::Default as u8 {
            let value = body[0];
            let keyword = if tag == Tag::Timeout as u8 {
                "timeout"
            } else {
                "default"
            };
            lines.push(format!("{keyword} {value}"));
        } else if tag == Tag::Color as u8 {
            lines.push(format!("color {}", color_name(body[0])));
        } else {
            return Err(FbError::InvalidMenu(format!("invalid menu type {tag}")));
        }
        ofs += size + 2;
    }
    Ok(lines)
}

fn split_nul(bytes: &[u8]) -> (&str, &[u8]) {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let s = core::str::from_utf8(&bytes[..end]).unwrap_or("");
    let rest = if end < bytes.len() {
        &bytes[end + 1..]
    } else {
        &bytes[end..]
    };
    (s, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_decodes_timeout_default_color() {
        let blob = compile("timeout 10\ndefault 0\ncolor yellow/blue\n").unwrap();
        let lines = decode(&blob).unwrap();
        assert_eq!(lines, vec!["timeout 10", "default 0", "color yellow/blue"]);
    }

    #[test]
    fn compiles_and_decodes_grldr_menu_entry() {
        let blob = compile("menu G grldr \"grldr\"\n").unwrap();
        let lines = decode(&blob).unwrap();
        assert_eq!(lines, vec!["menu G grldr \"grldr\""]);
    }

    #[test]
    fn compiles_and_decodes_linux_menu_entry_with_missing_args() {
        let blob = compile("menu L linux \"vmlinuz\"\n").unwrap();
        let lines = decode(&blob).unwrap();
        assert_eq!(lines, vec!["menu L linux \"vmlinuz\" \"\" \"\""]);
    }

    #[test]
    fn text_round_trips_with_and_without_newline() {
        let blob = compile("text hello world\ntext -n no newline here\n").unwrap();
        let lines = decode(&blob).unwrap();
        assert_eq!(lines, vec!["text \"hello world\"", "text -n \"no newline here\""]);
    }

    #[test]
    fn unknown_command_fails() {
        assert!(compile("frobnicate 1\n").is_err());
    }

    #[test]
    fn color_normal_round_trips() {
        let blob = compile("color normal\n").unwrap();
        let lines = decode(&blob).unwrap();
        assert_eq!(lines, vec!["color normal"]);
    }
}
