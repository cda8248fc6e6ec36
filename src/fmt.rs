//! Logging shim: forwards to `defmt` when enabled, otherwise compiles to nothing.
#![allow(unused_macros)]

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
pub(crate) use defmt::{debug, error, info, trace, warn};

#[cfg(not(feature = "defmt"))]
mod noop {
    macro_rules! trace {
        ($s:literal $(, $x:expr)* $(,)?) => {{
            let _ = ($( & $x ),*);
        }};
    }
    macro_rules! debug {
        ($s:literal $(, $x:expr)* $(,)?) => {{
            let _ = ($( & $x ),*);
        }};
    }
    macro_rules! info {
        ($s:literal $(, $x:expr)* $(,)?) => {{
            let _ = ($( & $x ),*);
        }};
    }
    // `warn` itself would clash with the built-in attribute.
    macro_rules! warner {
        ($s:literal $(, $x:expr)* $(,)?) => {{
            let _ = ($( & $x ),*);
        }};
    }
    macro_rules! error {
        ($s:literal $(, $x:expr)* $(,)?) => {{
            let _ = ($( & $x ),*);
        }};
    }

    #[allow(unused_imports)]
    pub(crate) use {debug, error, info, trace, warner as warn};
}

#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
pub(crate) use noop::{debug, error, info, trace, warn};

#[cfg(all(test, not(feature = "defmt")))]
mod tests {
    use super::{debug, error, info, trace, warn};

    #[test]
    fn macros_accept_arguments() {
        let id = 3u32;
        let name = "rescue";

        trace!("plain");
        debug!("module {=u32}", id);
        info!("module {=u32} ({=str})", id, name);
        warn!("module {=u32} rejected", id,);
        error!("{=str}", name);
    }
}
