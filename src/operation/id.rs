//! Path-segment identifiers used by the operation catalog.
//!
//! These only guarantee that an identifier can be spliced into a request path safely;
//! domain formats (MAC layout, site naming rules) are the caller's concern.

// std
use std::borrow::Borrow;
// self
use crate::_prelude::*;

const SEGMENT_MAX_LEN: usize = 128;

/// Error returned when an identifier cannot be used as a path segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (site, resource).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	Whitespace {
		/// Kind of identifier (site, resource).
		kind: &'static str,
	},
	/// The identifier would escape its path segment.
	#[error("{kind} identifier contains a path separator or traversal sequence.")]
	EscapesSegment {
		/// Kind of identifier (site, resource).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed length.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Kind of identifier (site, resource).
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

macro_rules! path_segment {
	($(#[$meta:meta])* $name:ident => $kind:literal) => {
		$(#[$meta])*
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Validates `raw` as a path segment.
			pub fn new(raw: impl Into<String>) -> Result<Self, IdentifierError> {
				Self::try_from(raw.into())
			}

			/// Borrowed segment text.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(raw: String) -> Result<Self, Self::Error> {
				check_segment($kind, &raw)?;

				Ok(Self(raw))
			}
		}
		impl From<$name> for String {
			fn from(id: $name) -> Self {
				id.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.debug_tuple(stringify!($name)).field(&self.0).finish()
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

path_segment! {
	/// Controller site identifier (`default`, or a site UUID).
	SiteId => "Site"
}
path_segment! {
	/// Identifier of a device, client, rule, or configuration object.
	ResourceId => "Resource"
}

fn check_segment(kind: &'static str, raw: &str) -> Result<(), IdentifierError> {
	match raw {
		"" => Err(IdentifierError::Empty { kind }),
		"." | ".." => Err(IdentifierError::EscapesSegment { kind }),
		_ if raw.chars().any(char::is_whitespace) => Err(IdentifierError::Whitespace { kind }),
		_ if raw.contains(['/', '\\', '?', '#']) => Err(IdentifierError::EscapesSegment { kind }),
		_ if raw.len() > SEGMENT_MAX_LEN =>
			Err(IdentifierError::TooLong { kind, max: SEGMENT_MAX_LEN }),
		_ => Ok(()),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn segments_reject_path_escapes() {
		assert!(SiteId::new("default").is_ok());
		assert_eq!(SiteId::new(""), Err(IdentifierError::Empty { kind: "Site" }));
		assert_eq!(SiteId::new(" default"), Err(IdentifierError::Whitespace { kind: "Site" }));
		assert_eq!(
			ResourceId::new("abc/../def"),
			Err(IdentifierError::EscapesSegment { kind: "Resource" })
		);
		assert!(ResourceId::new("..").is_err());
		assert!(ResourceId::new("aa:bb:cc:dd:ee:ff").is_ok());
	}

	#[test]
	fn deserialization_validates() {
		let site: SiteId =
			serde_json::from_str("\"default\"").expect("Site should deserialize successfully.");

		assert_eq!(site.as_str(), "default");
		assert!(serde_json::from_str::<SiteId>("\"with space\"").is_err());
		assert_eq!(format!("{site:?}"), "SiteId(\"default\")");
	}

	#[test]
	fn length_limit_is_inclusive() {
		ResourceId::new("a".repeat(SEGMENT_MAX_LEN)).expect("Exact length should succeed.");

		assert!(matches!(
			ResourceId::new("a".repeat(SEGMENT_MAX_LEN + 1)),
			Err(IdentifierError::TooLong { max: SEGMENT_MAX_LEN, .. })
		));
	}

	#[test]
	fn maps_can_be_queried_by_str() {
		let map = HashMap::from([(SiteId::new("default").expect("Site should be valid."), 7_u8)]);

		assert_eq!(map.get("default"), Some(&7));
	}
}
