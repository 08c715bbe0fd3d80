//! Cursor types, decode error taxonomy, and a growable write buffer shared by every
//! layer of the FlexNet client.

mod cursor;
mod decode;
mod write_buf;

pub use self::cursor::*;
pub use self::decode::*;
pub use self::write_buf::*;
