//! Exchange/routing-key binding parsing.
//!
//! A binding value is a comma-separated list of `exchange` or `exchange=routing-key` items.
//! Omitting the routing key binds with the topic wildcard `#`.

// self
use crate::_prelude::*;

/// Routing key used when a binding omits one.
pub const WILDCARD_ROUTING_KEY: &str = "#";

/// Errors emitted when parsing a binding value.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum BindingError {
	/// Exchange name is empty.
	#[error("Exchange name cannot be empty in `{input}`.")]
	EmptyExchange {
		/// The offending binding value.
		input: String,
	},
	/// `=` was given without a routing key.
	#[error("Routing key cannot be empty when '=' is provided in `{input}`.")]
	EmptyRoutingKey {
		/// The offending binding value.
		input: String,
	},
	/// An item contains more than one `=`.
	#[error(
		"Binding `{input}` is malformed; valid forms are 'a', 'a=x', 'a,b', 'a=x,b=y', and 'a,b=y'."
	)]
	Malformed {
		/// The offending binding value.
		input: String,
	},
}

/// Queue binding against a topic exchange.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Binding {
	/// Exchange name; never empty.
	pub exchange: String,
	/// Routing-key pattern; never empty.
	pub routing_key: String,
}
impl Binding {
	/// Builds a binding, rejecting empty names.
	pub fn new(
		exchange: impl Into<String>,
		routing_key: impl Into<String>,
	) -> Result<Self, BindingError> {
		let exchange = exchange.into();
		let routing_key = routing_key.into();

		if exchange.is_empty() {
			return Err(BindingError::EmptyExchange { input: format!("={routing_key}") });
		}
		if routing_key.is_empty() {
			return Err(BindingError::EmptyRoutingKey { input: format!("{exchange}=") });
		}

		Ok(Self { exchange, routing_key })
	}

	/// Binds every message on `exchange`.
	pub fn wildcard(exchange: impl Into<String>) -> Result<Self, BindingError> {
		Self::new(exchange, WILDCARD_ROUTING_KEY)
	}
}
impl Display for Binding {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}={}", self.exchange, self.routing_key)
	}
}
impl FromStr for Binding {
	type Err = BindingError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut parts = s.split('=');
		let exchange = parts.next().unwrap_or_default();
		let routing_key = parts.next();

		if parts.next().is_some() {
			return Err(BindingError::Malformed { input: s.into() });
		}
		if exchange.is_empty() {
			return Err(BindingError::EmptyExchange { input: s.into() });
		}

		match routing_key {
			None => Self::wildcard(exchange),
			Some("") => Err(BindingError::EmptyRoutingKey { input: s.into() }),
			Some(key) => Self::new(exchange, key),
		}
	}
}

/// Ordered, de-duplicated set of bindings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingSet(BTreeSet<Binding>);
impl BindingSet {
	/// Parses one comma-separated binding value.
	///
	/// Parsing is all-or-nothing: any malformed item rejects the whole value.
	pub fn parse(value: &str) -> Result<Self, BindingError> {
		let mut set = Self::default();

		set.extend_from(value)?;

		Ok(set)
	}

	/// Parses `value` and merges it into the set, leaving the set untouched on error.
	pub fn extend_from(&mut self, value: &str) -> Result<(), BindingError> {
		let parsed = value.split(',').map(Binding::from_str).collect::<Result<Vec<_>, _>>()?;

		self.0.extend(parsed);

		Ok(())
	}

	/// Merges another set into this one.
	pub fn merge(&mut self, other: BindingSet) {
		self.0.extend(other.0);
	}

	/// Number of distinct bindings.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no bindings are defined.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterator over bindings in stable order.
	pub fn iter(&self) -> impl Iterator<Item = &Binding> {
		self.0.iter()
	}

	/// Distinct exchange names, in order.
	pub fn exchanges(&self) -> Vec<&str> {
		let mut names = self.0.iter().map(|b| b.exchange.as_str()).collect::<Vec<_>>();

		names.dedup();

		names
	}
}
impl FromStr for BindingSet {
	type Err = BindingError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl FromIterator<Binding> for BindingSet {
	fn from_iter<I: IntoIterator<Item = Binding>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}
impl<'a> IntoIterator for &'a BindingSet {
	type IntoIter = std::collections::btree_set::Iter<'a, Binding>;
	type Item = &'a Binding;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn pairs(set: &BindingSet) -> Vec<(&str, &str)> {
		set.iter().map(|b| (b.exchange.as_str(), b.routing_key.as_str())).collect()
	}

	#[test]
	fn well_formed_values_yield_expected_pairs() {
		let cases: [(&str, &[(&str, &str)]); 4] = [
			("a", &[("a", "#")]),
			("a=x", &[("a", "x")]),
			("a=x,b=y", &[("a", "x"), ("b", "y")]),
			("a,b=y", &[("a", "#"), ("b", "y")]),
		];

		for (input, expected) in cases {
			let set = BindingSet::parse(input).expect("Well-formed binding should parse.");

			assert_eq!(pairs(&set), expected, "input: {input}");
		}
	}

	#[test]
	fn malformed_values_are_rejected() {
		assert!(matches!(BindingSet::parse(""), Err(BindingError::EmptyExchange { .. })));
		assert!(matches!(BindingSet::parse("=x"), Err(BindingError::EmptyExchange { .. })));
		assert!(matches!(BindingSet::parse("a,"), Err(BindingError::EmptyExchange { .. })));
		assert!(matches!(BindingSet::parse("a="), Err(BindingError::EmptyRoutingKey { .. })));
		assert!(matches!(BindingSet::parse("a=x=y"), Err(BindingError::Malformed { .. })));
	}

	#[test]
	fn failed_merge_registers_nothing() {
		let mut set = BindingSet::parse("a").expect("Seed binding should parse.");
		let err = set.extend_from("b=x,c=").expect_err("Empty routing key should fail.");

		assert!(err.to_string().contains("Routing key cannot be empty"));
		assert_eq!(pairs(&set), [("a", "#")]);
	}

	#[test]
	fn duplicates_collapse_and_exchanges_are_distinct() {
		let mut set = BindingSet::parse("a=x,a=x,a=y").expect("Bindings should parse.");

		set.extend_from("b").expect("Second value should parse.");

		assert_eq!(set.len(), 3);
		assert_eq!(set.exchanges(), ["a", "b"]);
	}

	#[test]
	fn display_round_trips_through_from_str() {
		let binding = Binding::wildcard("amq.topic").expect("Wildcard binding should build.");

		assert_eq!(binding.to_string(), "amq.topic=#");
		assert_eq!(Binding::from_str("amq.topic=#"), Ok(binding));
	}
}
