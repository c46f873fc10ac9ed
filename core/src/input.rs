//! Input classification by leading magic bytes.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::errors::InputError;

/// What kind of artifact a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    JavaClass,
    Apk,
    Jar,
    Dex,
}

/// Classify by the first four bytes; a ZIP container is an APK exactly when
/// the file name ends in `.apk`. Total over all prefixes: anything
/// unrecognized is `None`.
pub fn classify(prefix: [u8; 4], path: &Path) -> Option<InputKind> {
    match prefix {
        [0xca, 0xfe, 0xba, 0xbe] => Some(InputKind::JavaClass),
        [0x50, 0x4b, 0x03, 0x04] => {
            let is_apk = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("apk"));
            Some(if is_apk { InputKind::Apk } else { InputKind::Jar })
        }
        [0x64, 0x65, 0x78, 0x0a] => Some(InputKind::Dex),
        _ => None,
    }
}

/// Read the magic of `path` and classify it.
pub fn classify_path(path: &Path) -> Result<InputKind, InputError> {
    let mut file = File::open(path)?;
    let mut prefix = [0u8; 4];
    file.read_exact(&mut prefix)
        .map_err(|_| InputError::TooShort)?;

    classify(prefix, path).ok_or(InputError::UnknownMagic(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_table_is_total_and_exclusive() {
        let apk = Path::new("x.apk");
        let jar = Path::new("x.jar");

        assert_eq!(
            classify([0xca, 0xfe, 0xba, 0xbe], jar),
            Some(InputKind::JavaClass)
        );
        assert_eq!(classify([0x50, 0x4b, 0x03, 0x04], apk), Some(InputKind::Apk));
        assert_eq!(classify([0x50, 0x4b, 0x03, 0x04], jar), Some(InputKind::Jar));
        assert_eq!(
            classify([0x50, 0x4b, 0x03, 0x04], Path::new("noext")),
            Some(InputKind::Jar)
        );
        assert_eq!(classify([0x64, 0x65, 0x78, 0x0a], jar), Some(InputKind::Dex));
        assert_eq!(classify([0x00, 0x01, 0x02, 0x03], jar), None);
    }

    #[test]
    fn apk_suffix_is_case_insensitive() {
        assert_eq!(
            classify([0x50, 0x4b, 0x03, 0x04], Path::new("App.APK")),
            Some(InputKind::Apk)
        );
    }
}
