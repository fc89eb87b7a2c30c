mod decode_uri;

pub use decode_uri::*;
