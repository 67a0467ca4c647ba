use crate::reply::IntoReply;

/// A plain function or closure that can be bound to a method name.
///
/// Implemented for every `Fn(A1, .., An) -> R` up to twelve parameters where
/// `R: IntoReply`. `Args` is the tuple of parameter types and is inferred at
/// the bind site.
pub trait Handler<Args>: Send + Sync + 'static {
    type Output: IntoReply;

    fn invoke(&self, args: Args) -> Self::Output;
}

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        impl<F, R, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> R + Send + Sync + 'static,
            R: IntoReply,
        {
            type Output = R;

            #[allow(non_snake_case)]
            fn invoke(&self, args: ($($ty,)*)) -> R {
                let ($($ty,)*) = args;
                (self)($($ty),*)
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);
impl_handler!(A1, A2, A3, A4, A5);
impl_handler!(A1, A2, A3, A4, A5, A6);
impl_handler!(A1, A2, A3, A4, A5, A6, A7);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8, A9);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8, A9, A10);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12);
