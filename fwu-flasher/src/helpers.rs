/// Decodes a byte stream into text chunks without splitting UTF-8 sequences across chunks.
///
/// Invalid sequences are replaced, like [`String::from_utf8_lossy`].
#[derive(Debug, Default)]
pub(crate) struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    pub(crate) fn push(&mut self, data: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(data);

        let mut text = String::new();
        let mut consumed = 0;

        while consumed < self.pending.len() {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(x) => {
                    text.push_str(x);
                    consumed = self.pending.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&rest[..valid]));

                    match e.error_len() {
                        Some(n) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + n;
                        }
                        // Incomplete sequence at the end. Keep it for the next read.
                        None => {
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);

        (!text.is_empty()).then_some(text)
    }

    /// Whatever is left once the stream has ended.
    pub(crate) fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii() {
        let mut c = Utf8Chunker::default();
        assert_eq!(c.push(b"Writing at 0x00010000"), Some("Writing at 0x00010000".into()));
        assert_eq!(c.finish(), None);
    }

    #[test]
    fn split_multibyte() {
        // "✅" is e2 9c 85
        let mut c = Utf8Chunker::default();
        assert_eq!(c.push(b"ok \xe2\x9c"), Some("ok ".into()));
        assert_eq!(c.push(b"\x85 done"), Some("✅ done".into()));
        assert_eq!(c.finish(), None);
    }

    #[test]
    fn only_partial() {
        let mut c = Utf8Chunker::default();
        assert_eq!(c.push(b"\xe2"), None);
        assert_eq!(c.finish(), Some("\u{fffd}".into()));
    }

    #[test]
    fn invalid_bytes_replaced() {
        let mut c = Utf8Chunker::default();
        assert_eq!(c.push(b"a\xffb"), Some("a\u{fffd}b".into()));
    }

    #[test]
    fn invalid_byte_before_split_multibyte() {
        // "€" is e2 82 ac
        let mut c = Utf8Chunker::default();
        assert_eq!(c.push(b"a\xff\xe2"), Some("a\u{fffd}".into()));
        assert_eq!(c.push(b"\x82\xac"), Some("€".into()));
        assert_eq!(c.finish(), None);
    }
}
