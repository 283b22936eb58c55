// std
use std::sync::Arc;
// self
use oauth2_connectivity::{
	destination::{Destination, DestinationOptions},
	error::{ConfigError, Error, LoadError},
	loader::{
		DestinationAccessor, DestinationLoader, DestinationLoaderChain, InMemoryDestinationLoader,
	},
};

#[derive(Debug)]
struct Denying;
impl DestinationLoader for Denying {
	fn name(&self) -> &str {
		"denying"
	}

	fn try_get_destination(
		&self,
		destination_name: &str,
		_: &DestinationOptions,
	) -> Result<Destination, LoadError> {
		Err(LoadError::access(format!("Access to '{destination_name}' is denied.")))
	}
}

fn memory_with(name: &str, uri: &str) -> Arc<InMemoryDestinationLoader> {
	let loader = Arc::new(InMemoryDestinationLoader::default());

	loader
		.register(
			Destination::builder(uri)
				.name(name)
				.build_unproxied()
				.expect("Destination fixture should build."),
		)
		.expect("Named destination should register.");

	loader
}

fn isolated_accessor() -> DestinationAccessor {
	DestinationAccessor::with_default_chain(Arc::new(|| {
		DestinationLoaderChain::from_loader(Arc::new(InMemoryDestinationLoader::default()))
	}))
}

#[test]
fn first_loader_with_a_definitive_answer_wins() {
	let accessor = isolated_accessor();
	let first = memory_with("orders", "https://first.example");
	let second = memory_with("orders", "https://second.example");

	accessor.set_loader(Some(first));
	accessor.append_loader(second.clone());

	let destination =
		accessor.try_get_destination("orders").expect("First loader should resolve the name.");

	assert_eq!(destination.uri().as_str(), "https://first.example/");

	accessor.prepend_loader(Arc::new(Denying));

	match accessor.try_get_destination("orders") {
		Err(Error::Access(e)) => assert!(e.message.contains("'orders'")),
		other => panic!("Expected the prepended loader to abort, got {other:?}."),
	}

	accessor.set_loader(None);

	assert!(matches!(accessor.try_get_destination("orders"), Err(Error::NotFound(_))));
}

#[test]
fn nested_chains_are_flattened_and_deduplicated() {
	let a = memory_with("a", "https://a.example");
	let b = memory_with("b", "https://b.example");
	let inner = DestinationLoaderChain::new([
		a.clone() as Arc<dyn DestinationLoader>,
		b.clone() as Arc<dyn DestinationLoader>,
	])
	.expect("Inner chain should build.");
	let outer = DestinationLoaderChain::from_loader(Arc::new(inner))
		.append(a.clone())
		.prepend(Arc::new(Denying));

	assert_eq!(outer.len(), 3);
	assert_eq!(
		outer.loaders().iter().map(|loader| loader.name()).collect::<Vec<_>>(),
		["denying", "in-memory", "in-memory"]
	);
	assert!(matches!(
		DestinationLoaderChain::new(Vec::<Arc<dyn DestinationLoader>>::new()),
		Err(ConfigError::EmptyLoaderChain)
	));
}

#[test]
fn exhausted_chain_reports_consulted_loaders() {
	let chain = DestinationLoaderChain::new([
		memory_with("a", "https://a.example") as Arc<dyn DestinationLoader>,
		memory_with("b", "https://b.example") as Arc<dyn DestinationLoader>,
	])
	.expect("Chain should build.");

	match chain.try_get_destination("missing", &DestinationOptions::default()) {
		Err(LoadError::NotFound(e)) => {
			assert_eq!(e.consulted, ["in-memory", "in-memory"]);
			assert_eq!(e.name.as_deref(), Some("missing"));
		},
		other => panic!("Expected not found, got {other:?}."),
	}
}

#[test]
fn destinations_without_a_name_are_rejected_at_registration() {
	let loader = InMemoryDestinationLoader::default();
	let unnamed =
		Destination::builder("https://a.example").build_unproxied().expect("Destination builds.");
	let blank = Destination::builder("https://a.example")
		.name("  ")
		.build_unproxied()
		.expect("Destination builds.");

	assert!(matches!(loader.register(unnamed), Err(ConfigError::EmptyDestinationName)));
	assert!(matches!(loader.register(blank), Err(ConfigError::EmptyDestinationName)));
	assert!(loader.is_empty());
}
