use crate::CRLF;

/// Anything that can be sent as one bulk-string argument of a request.
///
/// `None` is sent as an empty string.
pub trait Argument {
    fn wire_bytes(&self) -> &[u8];
}

impl Argument for str {
    fn wire_bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Argument for String {
    fn wire_bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Argument for [u8] {
    fn wire_bytes(&self) -> &[u8] {
        self
    }
}

impl Argument for Vec<u8> {
    fn wire_bytes(&self) -> &[u8] {
        self
    }
}

impl<T: Argument + ?Sized> Argument for &T {
    fn wire_bytes(&self) -> &[u8] {
        (**self).wire_bytes()
    }
}

impl<T: Argument> Argument for Option<T> {
    fn wire_bytes(&self) -> &[u8] {
        match self {
            Some(arg) => arg.wire_bytes(),
            None => &[],
        }
    }
}

/// Encode a command as an array of bulk strings.
///
/// Bulk lengths are byte lengths, so multi-byte UTF-8 arguments are framed correctly.
pub fn encode_request<A: Argument>(args: &[A]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + args.len() * 16);
    out.push(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(CRLF);

    for arg in args.iter().map(Argument::wire_bytes) {
        out.push(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(CRLF);
        out.extend_from_slice(arg);
        out.extend_from_slice(CRLF);
    }

    out
}
