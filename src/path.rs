//! Path canonicalisation for generated Makefiles
//!
//! The generated Makefiles are consumed by an MSYS-style `make`, which
//! expects forward slashes and drive letters written as a root directory
//! (`C:\work` becomes `/c/work`).

/// Converts a path to the MSYS convention used inside generated Makefiles.
///
/// All backslashes become forward slashes. An absolute drive path such as
/// `C:/foo` is rewritten to `/c/foo`. Inputs shorter than four bytes are
/// only slash-normalized.
///
/// # Example
///
/// ```
/// use genmf::path::to_msys_path;
///
/// assert_eq!(to_msys_path("C:\\Users\\dev\\build"), "/c/Users/dev/build");
/// assert_eq!(to_msys_path("relative/x"), "relative/x");
/// ```
pub fn to_msys_path(path: &str) -> String {
    let slashed = path.replace('\\', "/");
    let bytes = slashed.as_bytes();

    if bytes.len() < 4 {
        return slashed;
    }

    if bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/' {
        let drive = (bytes[0] as char).to_ascii_lowercase();
        return format!("/{}{}", drive, &slashed[2..]);
    }

    slashed
}

/// Normalizes the path part of an `-I`/`-L` compiler flag, leaving other
/// flags untouched.
pub fn normalize_path_flag(flag: &str) -> String {
    if flag.starts_with("-I") || flag.starts_with("-L") {
        format!("{}{}", &flag[..2], to_msys_path(&flag[2..]))
    } else {
        flag.to_string()
    }
}
