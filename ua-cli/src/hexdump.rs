//! Hex-dump printing (spec.md §2: "hex-dump printing" is an external
//! collaborator left unspecified at the wire level). One line per 16
//! bytes: an 8-digit hex offset, then the bytes space-separated in hex,
//! the conventional `xxd`-style layout.

pub fn dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        out.push_str(&format!("{:08x}  ", i * 16));
        for byte in chunk {
            out.push_str(&format!("{byte:02x} "));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_one_line_per_sixteen_bytes() {
        let bytes: Vec<u8> = (0u8..20).collect();
        let text = dump(&bytes);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000000  "));
        assert!(lines[1].starts_with("00000010  "));
    }

    #[test]
    fn empty_input_produces_no_lines() {
        assert_eq!(dump(&[]), "");
    }
}
