//! Requested and granted OAuth scopes.

// self
use crate::_prelude::*;

/// Rejected scope input.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ScopeValidationError {
	/// An entry was empty (or the whole string was blank).
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// An entry carried embedded whitespace.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending entry.
		scope: String,
	},
}

/// Sorted, deduplicated scopes.
///
/// Travels as one space-delimited string in `scope` parameters, token responses, and the
/// credential file. A blank string in a credential file decodes to the empty set.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeSet(Vec<String>);
impl ScopeSet {
	/// Validates and normalizes `scopes`.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut entries = scopes
			.into_iter()
			.map(|scope| {
				let scope = scope.into();

				match scope {
					s if s.is_empty() => Err(ScopeValidationError::Empty),
					s if s.contains(char::is_whitespace) =>
						Err(ScopeValidationError::ContainsWhitespace { scope: s }),
					s => Ok(s),
				}
			})
			.collect::<Result<Vec<_>, _>>()?;

		entries.sort_unstable();
		entries.dedup();

		Ok(Self(entries))
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// `true` when no scope is requested.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Whether `scope` is part of the set.
	pub fn contains(&self, scope: &str) -> bool {
		self.0.binary_search_by(|entry| entry.as_str().cmp(scope)).is_ok()
	}

	/// Scopes in sorted order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	/// Space-delimited form.
	pub fn normalized(&self) -> String {
		self.0.join(" ")
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_list().entries(self.iter()).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"" => Ok(Self::default()),
			s if s.trim().is_empty() => Err(ScopeValidationError::Empty),
			s => Self::new(s.split_whitespace()),
		}
	}
}
impl TryFrom<String> for ScopeSet {
	type Error = ScopeValidationError;

	fn try_from(raw: String) -> Result<Self, Self::Error> {
		raw.trim().parse()
	}
}
impl From<ScopeSet> for String {
	fn from(scope: ScopeSet) -> Self {
		scope.normalized()
	}
}
