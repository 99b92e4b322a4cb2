//! # Bus Assembly Flows
//!
//! Configurator → builder → bus: specification ordering, apply-once
//! settings, validation and host bookkeeping.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use bus_core::{
        specification_fn, BusBuilder, BusFactorySpecification, BusHost, ConfigurationError,
        Envelope, InMemoryBusBuilder, InMemoryBusConfigurator, InMemoryHost, ScopeRegistrations,
        ScopeProvider, ServiceContainer, ValidationKind, ValidationResult,
    };

    use crate::fixtures::{journal, noop_handler, JournalHost};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Generic specification appending its label to a shared log.
    struct Label {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl BusFactorySpecification for Label {
        fn validate(&self) -> Vec<ValidationResult> {
            vec![ValidationResult::warning(self.label, "inspector")]
        }

        fn apply(&self, _builder: &mut dyn BusBuilder) -> Result<(), ConfigurationError> {
            self.log.lock().push(self.label);
            Ok(())
        }
    }

    // =============================================================================
    // SPECIFICATION REGISTRY
    // =============================================================================

    /// Specifications of both flavours apply in registration order, and only
    /// when the bus is built.
    #[test]
    fn test_build_applies_specifications_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut configurator = InMemoryBusConfigurator::new();

        configurator
            .add_specification(Label {
                label: "first",
                log: Arc::clone(&log),
            })
            .expect("first");
        let in_memory_log = Arc::clone(&log);
        configurator
            .add_in_memory_specification(specification_fn(move |_builder: &mut InMemoryBusBuilder| {
                in_memory_log.lock().push("second");
                Ok(())
            }))
            .expect("second");
        configurator
            .add_specification(Label {
                label: "third",
                log: Arc::clone(&log),
            })
            .expect("third");

        assert!(log.lock().is_empty(), "registration must not apply anything");
        configurator.build().expect("build");
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    /// A failing specification stops the build; later ones never run.
    #[test]
    fn test_failing_specification_aborts_build() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut configurator = InMemoryBusConfigurator::new();
        configurator
            .add_in_memory_specification(specification_fn(|_builder: &mut InMemoryBusBuilder| {
                Err(ConfigurationError::MissingArgument("connection"))
            }))
            .expect("failing");
        configurator
            .add_specification(Label {
                label: "after",
                log: Arc::clone(&log),
            })
            .expect("after");

        let err = configurator.build().expect_err("build fails");
        assert!(matches!(err, ConfigurationError::MissingArgument("connection")));
        assert!(log.lock().is_empty());
        assert!(!configurator.is_built());
    }

    /// Apply-once settings fail on the second call and keep the first value.
    #[tokio::test]
    async fn test_scope_hook_second_set_fails_first_kept() {
        let container = Arc::new(ServiceContainer::new());
        let mut configurator = InMemoryBusConfigurator::new();
        configurator.use_message_scope(container.clone()).expect("scope");
        configurator
            .set_scope_configuration_hook(|registrations: &mut ScopeRegistrations, _: &Envelope| {
                registrations.insert("first");
            })
            .expect("first hook");

        let err = configurator
            .set_scope_configuration_hook(|registrations: &mut ScopeRegistrations, _: &Envelope| {
                registrations.insert("second");
            })
            .expect_err("second hook");
        assert!(matches!(err, ConfigurationError::AlreadyConfigured(_)));

        let bus = configurator.build().expect("build");
        let provider = bus.scope_provider().expect("scoped");
        let scope = provider.open(&Envelope::new("Ping", serde_json::json!(null))).expect("open");
        assert_eq!(*scope.resolve::<&'static str>().expect("hook value"), "first");
    }

    // =============================================================================
    // VALIDATION
    // =============================================================================

    /// `validate()` is side-effect free: same results before and after build.
    #[test]
    fn test_validate_is_repeatable_across_build() {
        let mut configurator = InMemoryBusConfigurator::new();
        configurator.receive_endpoint("orders", |_endpoint| {}).expect("orders");
        configurator
            .add_specification(Label {
                label: "inspector",
                log: Arc::new(Mutex::new(Vec::new())),
            })
            .expect("inspector");

        let before = configurator.validate();
        configurator.build().expect("build");
        let after = configurator.validate();

        assert_eq!(before, after);
        assert_eq!(before.len(), 2);
        assert!(before.iter().all(|r| r.kind() == ValidationKind::Warning));
    }

    /// Registry findings come before specification findings.
    #[test]
    fn test_registry_results_come_first() {
        let mut configurator = InMemoryBusConfigurator::new();
        configurator
            .add_specification(Label {
                label: "inspector",
                log: Arc::new(Mutex::new(Vec::new())),
            })
            .expect("inspector");
        configurator.set_concurrency_limit(0).expect("limit");

        let results = configurator.validate();
        assert_eq!(results[0].source(), "bus");
        assert!(results[0].is_error());
        assert_eq!(results[1].source(), "inspector");
    }

    // =============================================================================
    // HOST COLLECTION
    // =============================================================================

    /// Every host registered during the build appears exactly once.
    #[test]
    fn test_built_bus_has_each_host_once() {
        let journal = journal();
        let extra = JournalHost::new("loopback://extra/", &journal).shared();
        let explicit = Arc::new(InMemoryHost::with_concurrency_limit(2));

        let mut configurator = InMemoryBusConfigurator::new();
        configurator.set_host(Arc::clone(&explicit)).expect("host");
        configurator.add_host(Arc::clone(&extra)).expect("extra");
        let extra_again = Arc::clone(&extra);
        configurator
            .add_in_memory_specification(specification_fn(move |builder: &mut InMemoryBusBuilder| {
                builder.add_host(Arc::clone(&extra_again));
                let in_memory: Arc<dyn BusHost> = builder.in_memory_host().clone();
                builder.add_host(in_memory);
                Ok(())
            }))
            .expect("spec");

        let bus = configurator.build().expect("build");
        assert_eq!(bus.hosts().len(), 2);
        assert!(bus.hosts().contains(&extra));
        assert!(Arc::ptr_eq(bus.in_memory_host(), &explicit));
    }

    /// The default host is created once, even across a failed build and a
    /// rejected rebuild.
    #[test]
    fn test_default_host_created_once() {
        let attempts = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&attempts);
        let mut configurator = InMemoryBusConfigurator::new();
        configurator
            .add_in_memory_specification(specification_fn(move |_builder: &mut InMemoryBusBuilder| {
                let mut attempts = counter.lock();
                *attempts += 1;
                if *attempts == 1 {
                    Err(ConfigurationError::MissingArgument("first attempt"))
                } else {
                    Ok(())
                }
            }))
            .expect("spec");

        configurator.build().expect_err("first attempt fails");
        let default_host = Arc::clone(configurator.host().expect("default host"));

        let bus = configurator.build().expect("second attempt");
        assert!(Arc::ptr_eq(bus.in_memory_host(), &default_host));
        assert_eq!(bus.hosts().len(), 1);

        assert!(matches!(configurator.build(), Err(ConfigurationError::AlreadyBuilt)));
        assert!(Arc::ptr_eq(configurator.host().expect("host"), &default_host));
    }

    /// One endpoint and a limit of four: one host with `orders` connected.
    #[test]
    fn test_single_endpoint_with_limit() {
        let mut configurator = InMemoryBusConfigurator::new();
        configurator.set_concurrency_limit(4).expect("limit");
        configurator
            .receive_endpoint("orders", |endpoint| {
                endpoint.handler("SubmitOrder", noop_handler());
            })
            .expect("orders");

        let bus = configurator.build().expect("build");
        assert_eq!(bus.hosts().len(), 1);
        assert_eq!(bus.in_memory_host().concurrency_limit(), 4);
        assert_eq!(bus.in_memory_host().endpoint_names(), vec!["orders".to_string()]);
    }

    /// Duplicate queue names are reported by validation and rejected by build.
    #[test]
    fn test_duplicate_endpoint() {
        let mut configurator = InMemoryBusConfigurator::new();
        for _ in 0..2 {
            configurator
                .receive_endpoint("orders", |endpoint| {
                    endpoint.handler("SubmitOrder", noop_handler());
                })
                .expect("orders");
        }

        let results = configurator.validate();
        assert_eq!(results.iter().filter(|r| r.is_error()).count(), 1);
        assert!(matches!(
            configurator.build(),
            Err(ConfigurationError::DuplicateEndpoint(name)) if name == "orders"
        ));
    }
}
