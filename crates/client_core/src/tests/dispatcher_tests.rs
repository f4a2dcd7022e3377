use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use shared::{domain::JobId, events::JobRef};

use super::*;
use crate::diagnostics::RecordingSink;

fn dispatcher() -> (Dispatcher, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    (Dispatcher::new(sink.clone()), sink)
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn started(job_id: &str) -> PushEvent {
    PushEvent::JobStarted(JobRef {
        job_id: JobId::from(job_id),
    })
}

#[test]
fn every_handler_for_an_event_runs() {
    let (dispatcher, _sink) = dispatcher();
    let calls = counter();
    let _subs: Vec<Subscription> = (0..3)
        .map(|_| {
            let calls = Arc::clone(&calls);
            dispatcher.subscribe(EventKind::Heartbeat, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .collect();

    let outcome = dispatcher.dispatch(&PushEvent::Heartbeat(Default::default()));

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        outcome,
        DispatchOutcome {
            delivered: 3,
            failed: 0
        }
    );
}

#[test]
fn handlers_only_see_their_own_kind() {
    let (dispatcher, _sink) = dispatcher();
    let calls = counter();
    let seen = Arc::clone(&calls);
    let _sub = dispatcher.subscribe(EventKind::JobStarted, move |event| {
        assert_eq!(event.kind(), EventKind::JobStarted);
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    dispatcher.dispatch(&PushEvent::connected());
    dispatcher.dispatch(&started("j1"));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribe_removes_exactly_one_registration() {
    let (dispatcher, _sink) = dispatcher();
    let first = counter();
    let second = counter();

    let first_calls = Arc::clone(&first);
    let first_sub = dispatcher.subscribe(EventKind::JobStarted, move |_| {
        first_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let second_calls = Arc::clone(&second);
    let _second_sub = dispatcher.subscribe(EventKind::JobStarted, move |_| {
        second_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert_eq!(dispatcher.handler_count(EventKind::JobStarted), 2);

    first_sub.unsubscribe();
    dispatcher.dispatch(&started("j1"));

    assert_eq!(dispatcher.handler_count(EventKind::JobStarted), 1);
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn dropping_a_subscription_unregisters_it() {
    let (dispatcher, _sink) = dispatcher();
    {
        let _sub = dispatcher.subscribe(EventKind::Heartbeat, |_| Ok(()));
        assert_eq!(dispatcher.handler_count(EventKind::Heartbeat), 1);
    }
    assert_eq!(dispatcher.handler_count(EventKind::Heartbeat), 0);
}

#[test]
fn failing_and_panicking_handlers_do_not_stop_the_others() {
    let (dispatcher, sink) = dispatcher();
    let calls = counter();

    let _failing = dispatcher.subscribe(EventKind::JobStarted, |_| Err(anyhow!("boom")));
    let _panicking = dispatcher.subscribe(EventKind::JobStarted, |_| panic!("handler exploded"));
    let after = Arc::clone(&calls);
    let _healthy = dispatcher.subscribe(EventKind::JobStarted, move |_| {
        after.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let outcome = dispatcher.dispatch(&started("j1"));
    assert_eq!(
        outcome,
        DispatchOutcome {
            delivered: 1,
            failed: 2
        }
    );

    // Later events still flow through the same handlers.
    dispatcher.dispatch(&started("j2"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let entries = sink.entries();
    assert_eq!(entries.len(), 4);
    assert!(entries.contains(&Diagnostic::HandlerFailed {
        event: EventKind::JobStarted,
        error: "boom".into(),
    }));
    assert!(entries.contains(&Diagnostic::HandlerPanicked {
        event: EventKind::JobStarted,
        message: "handler exploded".into(),
    }));
}

#[test]
fn handlers_may_subscribe_during_dispatch() {
    let (dispatcher, _sink) = dispatcher();
    let late = Arc::new(Mutex::new(Vec::<Subscription>::new()));

    let registry = dispatcher.clone();
    let late_subs = Arc::clone(&late);
    let _sub = dispatcher.subscribe(EventKind::Connected, move |_| {
        late_subs
            .lock()
            .push(registry.subscribe(EventKind::Heartbeat, |_| Ok(())));
        Ok(())
    });

    let outcome = dispatcher.dispatch(&PushEvent::connected());
    assert_eq!(outcome.delivered, 1);
    assert_eq!(dispatcher.handler_count(EventKind::Heartbeat), 1);
}

#[test]
fn dispatch_without_handlers_is_a_no_op() {
    let (dispatcher, sink) = dispatcher();
    assert_eq!(
        dispatcher.dispatch(&PushEvent::disconnected()),
        DispatchOutcome::default()
    );
    assert!(sink.is_empty());
}
