//! # Scope Provisioning Flows
//!
//! Root scope sharing under concurrency, per-message customization, and
//! scope release on every delivery outcome.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use parking_lot::Mutex;
    use serde_json::json;

    use bus_core::{
        handler_fn, ConsumeContext, ContainerScopeProvider, Envelope, HandlerError,
        InMemoryBusConfigurator, ScopeHandle, ScopeId, ScopeProvider, ScopeRegistrations,
        ScopeView, ServiceContainer,
    };

    use crate::fixtures::wait_until;

    fn ping() -> Envelope {
        Envelope::new("Ping", json!({}))
    }

    // =============================================================================
    // ROOT SCOPE
    // =============================================================================

    /// Concurrent opens share one root; every scope is released exactly once
    /// regardless of close order.
    #[test]
    fn test_concurrent_opens_share_root() {
        const THREADS: usize = 16;

        let container = Arc::new(ServiceContainer::new());
        let provider = Arc::new(ContainerScopeProvider::new(container.clone(), "message", None));
        let barrier = Arc::new(Barrier::new(THREADS));

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let provider = Arc::clone(&provider);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    provider.open(&ping()).expect("open")
                })
            })
            .collect();
        let mut scopes: Vec<_> = workers
            .into_iter()
            .map(|worker| worker.join().expect("worker"))
            .collect();

        assert_eq!(container.roots_created(), 1);
        let parents: HashSet<_> = scopes.iter().map(|s| s.handle().parent()).collect();
        assert_eq!(parents.len(), 1);
        let ids: HashSet<_> = scopes.iter().map(|s| s.id()).collect();
        assert_eq!(ids.len(), THREADS);

        // Drop every other scope, then close the rest newest first.
        let mut index = 0;
        scopes.retain(|_| {
            index += 1;
            index % 2 == 1
        });
        assert_eq!(container.disposed(), THREADS / 2);
        while let Some(scope) = scopes.pop() {
            scope.close();
        }

        assert_eq!(container.disposed(), THREADS);
        assert_eq!(container.live_scopes(), 1, "only the root is left");
        drop(provider);
        assert_eq!(container.live_scopes(), 0);
    }

    /// Each bus gets its own root; roots are never shared across providers.
    #[test]
    fn test_each_provider_owns_its_root() {
        let container = Arc::new(ServiceContainer::new());
        let first = ContainerScopeProvider::new(container.clone(), "message", None);
        let second = ContainerScopeProvider::new(container.clone(), "message", None);

        let a = first.open(&ping()).expect("first");
        let b = second.open(&ping()).expect("second");

        assert_eq!(container.roots_created(), 2);
        assert_ne!(a.handle().parent(), b.handle().parent());
    }

    // =============================================================================
    // PER-MESSAGE CUSTOMIZATION
    // =============================================================================

    /// The hook runs once per scope and sees a distinct scope each time.
    #[test]
    fn test_hook_runs_per_scope() {
        let container = Arc::new(ServiceContainer::new());
        let seen: Arc<Mutex<Vec<ScopeId>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let provider = ContainerScopeProvider::new(
            container,
            "message",
            Some(Arc::new(move |registrations: &mut ScopeRegistrations, _envelope: &Envelope| {
                recorder.lock().push(registrations.scope_id());
            })),
        );

        let scopes: Vec<_> = (0..3).map(|_| provider.open(&ping()).expect("open")).collect();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 3);
        let opened: Vec<ScopeId> = scopes.iter().map(|s| s.id()).collect();
        assert_eq!(*seen, opened);
    }

    /// Scoped factories produce one instance per message scope.
    #[tokio::test]
    async fn test_handlers_see_scoped_services() {
        struct UnitOfWork {
            scope: ScopeId,
        }

        let container = Arc::new(ServiceContainer::new());
        container.register_scoped(|scope: &ScopeHandle| UnitOfWork { scope: scope.id() });

        let matches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&matches);
        let handler = handler_fn(move |context: ConsumeContext| {
            let counter = Arc::clone(&counter);
            async move {
                let scope = context.scope().expect("scope").id();
                let first = context.resolve::<UnitOfWork>().expect("unit of work");
                let again = context.resolve::<UnitOfWork>().expect("unit of work");
                if first.scope == scope && Arc::ptr_eq(&first, &again) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<(), HandlerError>(())
            }
        });

        let mut configurator = InMemoryBusConfigurator::new();
        configurator.use_message_scope(container.clone()).expect("scope");
        configurator
            .receive_endpoint("work", move |endpoint| {
                endpoint.handler("Ping", handler);
            })
            .expect("work");
        let bus = configurator.build().expect("build");

        bus.start().await.expect("start");
        for _ in 0..3 {
            bus.send("work", ping()).expect("send");
        }
        let observed = Arc::clone(&matches);
        wait_until(move || observed.load(Ordering::SeqCst) == 3).await;
        bus.stop().await.expect("stop");

        assert_eq!(container.children_created(), 3);
        assert_eq!(container.disposed(), 3);
    }

    // =============================================================================
    // RELEASE
    // =============================================================================

    /// A failing handler still releases its scope.
    #[tokio::test]
    async fn test_handler_failure_releases_scope() {
        let container = Arc::new(ServiceContainer::new());
        let failing = handler_fn(|context: ConsumeContext| async move {
            Err::<(), HandlerError>(HandlerError::new(context.message_type(), "rejected"))
        });

        let mut configurator = InMemoryBusConfigurator::new();
        configurator.use_message_scope(container.clone()).expect("scope");
        configurator
            .receive_endpoint("work", move |endpoint| {
                endpoint.handler("Ping", failing);
            })
            .expect("work");
        let bus = configurator.build().expect("build");

        bus.start().await.expect("start");
        bus.send("work", ping()).expect("send");
        let host = Arc::clone(bus.in_memory_host());
        wait_until(move || host.messages_faulted() == 1).await;
        bus.stop().await.expect("stop");

        assert_eq!(container.children_created(), 1);
        assert_eq!(container.disposed(), 1);
    }

    /// A view kept past its message no longer resolves message values.
    #[tokio::test]
    async fn test_view_kept_by_handler_does_not_extend_scope() {
        let container = Arc::new(ServiceContainer::new());
        container.register_singleton(7u32);

        let kept: Arc<Mutex<Option<ScopeView>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&kept);
        let handler = handler_fn(move |context: ConsumeContext| {
            let slot = Arc::clone(&slot);
            async move {
                *slot.lock() = context.scope().cloned();
                Ok::<(), HandlerError>(())
            }
        });

        let mut configurator = InMemoryBusConfigurator::new();
        configurator.use_message_scope(container.clone()).expect("scope");
        configurator
            .receive_endpoint("work", move |endpoint| {
                endpoint.handler("Ping", handler);
            })
            .expect("work");
        let bus = configurator.build().expect("build");

        bus.start().await.expect("start");
        bus.send("work", ping()).expect("send");
        let released = Arc::clone(&container);
        wait_until(move || released.disposed() == 1).await;
        bus.stop().await.expect("stop");

        let view = kept.lock().clone().expect("view captured");
        assert!(view.resolve::<Envelope>().is_none());
        assert_eq!(view.resolve::<u32>().as_deref(), Some(&7));
    }
}
