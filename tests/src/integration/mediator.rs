//! # Mediator Flows
//!
//! Inline dispatch: every send runs in the caller's task inside its own
//! message scope, and the handler outcome comes straight back.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use bus_core::{
        handler_fn, BusError, ConfigurationError, ConsumeContext, Envelope, HandlerError,
        MediatorConfigurator, ReceiveEndpointConfigurator, ScopeId, ScopeProvider,
        ScopeRegistrations, ServiceContainer, TransportError,
    };

    /// Per-message value registered by the scope hook.
    struct Tenant(String);

    fn tenant_hook(registrations: &mut ScopeRegistrations, envelope: &Envelope) {
        let tenant = envelope.header("tenant").unwrap_or("default").to_string();
        registrations.insert(Tenant(tenant));
    }

    // =============================================================================
    // INLINE DISPATCH
    // =============================================================================

    /// Each send opens and releases one scope before returning.
    #[tokio::test]
    async fn test_each_send_gets_its_own_scope() {
        let container = Arc::new(ServiceContainer::new());
        let seen: Arc<Mutex<Vec<(ScopeId, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);

        let mut configurator = MediatorConfigurator::new(container.clone());
        configurator.set_scope_configuration_hook(tenant_hook).expect("hook");
        configurator
            .configure_mediator(move |endpoint: &mut ReceiveEndpointConfigurator| {
                endpoint.handler(
                    "Greet",
                    handler_fn(move |context: ConsumeContext| {
                        let recorder = Arc::clone(&recorder);
                        async move {
                            let scope = context
                                .scope()
                                .ok_or_else(|| HandlerError::new("Greet", "no scope"))?;
                            let tenant = context
                                .resolve::<Tenant>()
                                .ok_or_else(|| HandlerError::new("Greet", "no tenant"))?;
                            recorder.lock().push((scope.id(), tenant.0.clone()));
                            Ok::<(), HandlerError>(())
                        }
                    }),
                );
            })
            .expect("configure");
        let mediator = configurator.build().expect("build");

        for tenant in ["acme", "globex"] {
            mediator
                .send(Envelope::new("Greet", json!(null)).with_header("tenant", tenant))
                .await
                .expect("send");
            // Released before `send` returns.
            assert_eq!(container.disposed(), container.children_created());
        }

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0].0, seen[1].0);
        assert_eq!(seen[0].1, "acme");
        assert_eq!(seen[1].1, "globex");
        assert_eq!(mediator.scope_provider().scope_name(), "message");
    }

    /// Handler failures come back to the caller and still release the scope.
    #[tokio::test]
    async fn test_handler_error_returned_to_caller() {
        let container = Arc::new(ServiceContainer::new());
        let mut configurator = MediatorConfigurator::new(container.clone());
        configurator
            .configure_mediator(|endpoint: &mut ReceiveEndpointConfigurator| {
                endpoint.handler(
                    "Reject",
                    handler_fn(|context: ConsumeContext| async move {
                        Err::<(), HandlerError>(HandlerError::new(
                            context.message_type(),
                            "refused",
                        ))
                    }),
                );
            })
            .expect("configure");
        let mediator = configurator.build().expect("build");

        let err = mediator
            .send(Envelope::new("Reject", json!(null)))
            .await
            .expect_err("handler fails");
        assert!(matches!(err, BusError::Handler(ref e) if e.reason == "refused"));
        assert_eq!(container.disposed(), 1);

        let err = mediator
            .send(Envelope::new("Unknown", json!(null)))
            .await
            .expect_err("no handler");
        assert!(matches!(
            err,
            BusError::Transport(TransportError::NoHandler(ref t)) if t == "Unknown"
        ));
        assert_eq!(container.children_created(), 1, "no scope for unhandled types");
    }

    // =============================================================================
    // CONFIGURATION
    // =============================================================================

    /// Mediator configuration and scope hook are apply-once.
    #[test]
    fn test_configuration_is_apply_once() {
        let mut configurator = MediatorConfigurator::new(Arc::new(ServiceContainer::new()));
        configurator
            .configure_mediator(|_endpoint: &mut ReceiveEndpointConfigurator| {})
            .expect("first");
        assert!(matches!(
            configurator.configure_mediator(|_endpoint: &mut ReceiveEndpointConfigurator| {}),
            Err(ConfigurationError::AlreadyConfigured(_))
        ));

        configurator.set_scope_configuration_hook(tenant_hook).expect("hook");
        assert!(matches!(
            configurator.set_scope_configuration_hook(tenant_hook),
            Err(ConfigurationError::AlreadyConfigured(_))
        ));
    }

    /// A custom scope name is used for every mediator scope.
    #[tokio::test]
    async fn test_custom_scope_name() {
        let mut configurator = MediatorConfigurator::new(Arc::new(ServiceContainer::new()));
        assert!(matches!(
            configurator.set_scope_name(""),
            Err(ConfigurationError::MissingArgument(_))
        ));
        configurator.set_scope_name("request").expect("name");

        let tags = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&tags);
        configurator
            .configure_mediator(move |endpoint: &mut ReceiveEndpointConfigurator| {
                endpoint.handler(
                    "Ping",
                    handler_fn(move |context: ConsumeContext| {
                        let recorder = Arc::clone(&recorder);
                        async move {
                            if let Some(scope) = context.scope() {
                                recorder.lock().push(scope.tag().to_string());
                            }
                            Ok::<(), HandlerError>(())
                        }
                    }),
                );
            })
            .expect("configure");
        let mediator = configurator.build().expect("build");

        mediator
            .send(Envelope::new("Ping", json!(null)))
            .await
            .expect("send");
        assert_eq!(*tags.lock(), vec!["request".to_string()]);
    }
}
