//! The narrow contract for external clients started after config is loaded.
//!
//! Clients (caches, brokers, databases) live outside this crate. They only
//! need to expose [`Component`]; [`init_all`] brings a batch up in parallel.

use std::any::Any;
use std::thread;

use tracing::{debug, warn};

use crate::error::EnvflagError;

pub trait Component: Send {
    fn name(&self) -> &str;

    fn init(&mut self) -> Result<(), EnvflagError>;

    fn close(&mut self) -> Result<(), EnvflagError> {
        Ok(())
    }

    fn liveness_check(&self) -> Result<(), EnvflagError> {
        Ok(())
    }
}

/// Run every component's `init` on its own scoped thread.
///
/// Waits for all of them, even after a failure, then returns the first error
/// in slice order. A panicking `init` is reported as
/// [`EnvflagError::Component`].
pub fn init_all(components: &mut [Box<dyn Component>]) -> Result<(), EnvflagError> {
    let names: Vec<String> = components.iter().map(|c| c.name().to_string()).collect();
    debug!(count = components.len(), "initializing components");

    let results: Vec<Result<(), EnvflagError>> = thread::scope(|s| {
        let handles: Vec<_> = components
            .iter_mut()
            .map(|component| s.spawn(move || component.init()))
            .collect();
        handles
            .into_iter()
            .zip(&names)
            .map(|(handle, name)| {
                handle.join().unwrap_or_else(|payload| {
                    Err(EnvflagError::Component {
                        name: name.clone(),
                        reason: format!("init panicked: {}", panic_message(&*payload)),
                    })
                })
            })
            .collect()
    });

    let mut first = None;
    for (result, name) in results.into_iter().zip(&names) {
        if let Err(e) = result {
            warn!(component = %name, error = %e, "init failed");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

/// Close components in reverse order. Every component is closed; the first
/// error (in closing order) is returned.
pub fn close_all(components: &mut [Box<dyn Component>]) -> Result<(), EnvflagError> {
    let mut first = None;
    for component in components.iter_mut().rev() {
        if let Err(e) = component.close() {
            warn!(component = %component.name(), error = %e, "close failed");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

/// Liveness of every component, in order.
pub fn liveness(components: &[Box<dyn Component>]) -> Vec<(String, Result<(), EnvflagError>)> {
    components
        .iter()
        .map(|c| (c.name().to_string(), c.liveness_check()))
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tracked {
        name: &'static str,
        fail: bool,
        panic: bool,
        inits: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
        live: bool,
    }

    impl Tracked {
        fn new(name: &'static str, inits: &Arc<AtomicUsize>) -> Self {
            Self {
                name,
                fail: false,
                panic: false,
                inits: Arc::clone(inits),
                closed: Arc::new(AtomicUsize::new(0)),
                live: false,
            }
        }
    }

    impl Component for Tracked {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&mut self) -> Result<(), EnvflagError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("boom");
            }
            if self.fail {
                return Err(EnvflagError::Component {
                    name: self.name.to_string(),
                    reason: "refused".into(),
                });
            }
            self.live = true;
            Ok(())
        }

        fn close(&mut self) -> Result<(), EnvflagError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            self.live = false;
            Ok(())
        }

        fn liveness_check(&self) -> Result<(), EnvflagError> {
            if self.live {
                Ok(())
            } else {
                Err(EnvflagError::Component {
                    name: self.name.to_string(),
                    reason: "not running".into(),
                })
            }
        }
    }

    #[test]
    fn init_all_runs_every_component() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut components: Vec<Box<dyn Component>> = vec![
            Box::new(Tracked::new("redis", &inits)),
            Box::new(Tracked::new("mqtt", &inits)),
        ];
        init_all(&mut components).unwrap();
        assert_eq!(inits.load(Ordering::SeqCst), 2);
        assert!(liveness(&components).iter().all(|(_, r)| r.is_ok()));
    }

    #[test]
    fn first_error_in_order_after_all_finish() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut a = Tracked::new("a", &inits);
        a.fail = true;
        let mut c = Tracked::new("c", &inits);
        c.fail = true;
        let mut components: Vec<Box<dyn Component>> =
            vec![Box::new(a), Box::new(Tracked::new("b", &inits)), Box::new(c)];

        let err = init_all(&mut components).unwrap_err();
        assert!(matches!(err, EnvflagError::Component { ref name, .. } if name == "a"));
        assert_eq!(inits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panic_is_reported_as_error() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut p = Tracked::new("pulsar", &inits);
        p.panic = true;
        let mut components: Vec<Box<dyn Component>> =
            vec![Box::new(Tracked::new("ok", &inits)), Box::new(p)];

        let err = init_all(&mut components).unwrap_err();
        match err {
            EnvflagError::Component { name, reason } => {
                assert_eq!(name, "pulsar");
                assert!(reason.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(inits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn close_all_closes_everything() {
        let inits = Arc::new(AtomicUsize::new(0));
        let a = Tracked::new("a", &inits);
        let closed_a = Arc::clone(&a.closed);
        let b = Tracked::new("b", &inits);
        let closed_b = Arc::clone(&b.closed);
        let mut components: Vec<Box<dyn Component>> = vec![Box::new(a), Box::new(b)];

        init_all(&mut components).unwrap();
        close_all(&mut components).unwrap();
        assert_eq!(closed_a.load(Ordering::SeqCst), 1);
        assert_eq!(closed_b.load(Ordering::SeqCst), 1);
        assert!(liveness(&components).iter().all(|(_, r)| r.is_err()));
    }
}
