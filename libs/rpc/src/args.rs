//! Argument lists.
//!
//! Rust has no variadic functions, so arguments travel as tuples: the client
//! packs `(a, b, c)` into one MessagePack array and the server unpacks it into
//! the parameter types of the bound handler.

use serde::{de::DeserializeOwned, Serialize};
use wirecall_fabric::codec::{ArgsReader, ArgsWriter};
use wirecall_fabric::Result;

/// A tuple of values that can be sent as call arguments
pub trait Arguments {
    const COUNT: usize;

    fn pack(&self) -> Result<Vec<u8>>;
}

/// A tuple of parameter types a handler accepts
pub trait FromArguments: Sized {
    const ARITY: usize;

    /// Decode every element; the caller has already checked the count
    fn unpack(reader: &mut ArgsReader<'_>) -> Result<Self>;
}

macro_rules! impl_arguments {
    ($count:expr; $($ty:ident),*) => {
        impl<$($ty: Serialize,)*> Arguments for ($($ty,)*) {
            const COUNT: usize = $count;

            #[allow(non_snake_case, unused_mut)]
            fn pack(&self) -> Result<Vec<u8>> {
                let ($($ty,)*) = self;
                let mut writer = ArgsWriter::new($count)?;
                $(writer.push($ty)?;)*
                writer.finish()
            }
        }

        impl<$($ty: DeserializeOwned,)*> FromArguments for ($($ty,)*) {
            const ARITY: usize = $count;

            #[allow(unused_variables)]
            fn unpack(reader: &mut ArgsReader<'_>) -> Result<Self> {
                Ok(($(reader.read::<$ty>()?,)*))
            }
        }
    };
}

impl_arguments!(0;);
impl_arguments!(1; A1);
impl_arguments!(2; A1, A2);
impl_arguments!(3; A1, A2, A3);
impl_arguments!(4; A1, A2, A3, A4);
impl_arguments!(5; A1, A2, A3, A4, A5);
impl_arguments!(6; A1, A2, A3, A4, A5, A6);
impl_arguments!(7; A1, A2, A3, A4, A5, A6, A7);
impl_arguments!(8; A1, A2, A3, A4, A5, A6, A7, A8);
impl_arguments!(9; A1, A2, A3, A4, A5, A6, A7, A8, A9);
impl_arguments!(10; A1, A2, A3, A4, A5, A6, A7, A8, A9, A10);
impl_arguments!(11; A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11);
impl_arguments!(12; A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12);
