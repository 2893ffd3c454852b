/// Shared types used across the codebase

/// Declares a closed set of string-valued variants stored as TEXT columns and
/// carried as snake_case strings on the wire.
///
/// Generates `as_str`, `ALL`, `Display` and `FromStr` (unknown values become a
/// `ParseEnumError` naming the enum).
#[macro_export]
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::types::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::types::ParseEnumError {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// A stored or submitted value that is not one of the enum's variants
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} value '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[cfg(test)]
mod tests {
    text_enum! {
        pub enum Color {
            Red => "red",
            DarkBlue => "dark_blue",
        }
    }

    #[test]
    fn parses_and_prints_text_values() {
        assert_eq!("dark_blue".parse::<Color>().unwrap(), Color::DarkBlue);
        assert_eq!(Color::Red.to_string(), "red");
        assert_eq!(Color::ALL.len(), 2);
    }

    #[test]
    fn rejects_unknown_text() {
        let err = "green".parse::<Color>().unwrap_err();
        assert_eq!(err.kind, "Color");
        assert_eq!(err.value, "green");
    }

    #[test]
    fn serde_uses_text_values() {
        assert_eq!(serde_json::to_string(&Color::DarkBlue).unwrap(), "\"dark_blue\"");
        let c: Color = serde_json::from_str("\"red\"").unwrap();
        assert_eq!(c, Color::Red);
    }
}
