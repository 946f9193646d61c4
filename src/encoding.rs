//! Field codecs shared by every packet: the remaining-length integer, the
//! length-prefixed UTF-8 string and length-prefixed binary data.

pub mod binary;
pub mod string;
pub mod variable_int;

pub use binary::{binary_len, decode_binary, encode_binary};
pub use string::{decode_string, encode_string, string_len};
pub use variable_int::{
    decode_variable_int, encode_variable_int, encoded_variable_int_len, VARIABLE_INT_MAX,
};
