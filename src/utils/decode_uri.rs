use anyhow::Context;

/// Percent-decodes `uri` into a UTF-8 string.
pub fn decode_uri(uri: &str) -> anyhow::Result<String> {
    let input = uri.as_bytes();
    let mut bytes = Vec::with_capacity(input.len());
    let mut idx = 0;
    while idx < input.len() {
        match input[idx] {
            b'%' => {
                let hex = input
                    .get(idx + 1..idx + 3)
                    .ok_or_else(|| anyhow::format_err!("malformed URI sequence at {}", idx))?;
                let hex = std::str::from_utf8(hex).with_context(|| "malformed URI sequence")?;
                bytes.push(
                    u8::from_str_radix(hex, 16)
                        .with_context(|| format!("malformed URI sequence '%{}'", hex))?,
                );
                idx += 3;
            }
            byte => {
                bytes.push(byte);
                idx += 1;
            }
        }
    }
    String::from_utf8(bytes).with_context(|| "URIError")
}
