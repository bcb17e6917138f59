use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};

use super::views::SelectionHandler;
use crate::EcolapError;
use crate::telemetry::TrackIdentifier;

/// Selection made in one view, to be mirrored by the others
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SelectionEvent {
    PointSelected {
        time: f64,
        track: TrackIdentifier,
    },
    IntervalSelected {
        low: f64,
        high: f64,
        track: TrackIdentifier,
    },
    SelectionCleared,
}

impl SelectionEvent {
    /// Interval event with its bounds in increasing order
    pub fn interval(a: f64, b: f64, track: TrackIdentifier) -> Self {
        SelectionEvent::IntervalSelected {
            low: a.min(b),
            high: a.max(b),
            track,
        }
    }

    pub fn track(&self) -> Option<TrackIdentifier> {
        match self {
            SelectionEvent::PointSelected { track, .. }
            | SelectionEvent::IntervalSelected { track, .. } => Some(*track),
            SelectionEvent::SelectionCleared => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(usize);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct DeliveryFailure {
    pub subscriber: SubscriberId,
    pub error: EcolapError,
}

/// Outcome of a publication
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Number of handler calls that succeeded
    pub delivered: usize,
    pub failures: Vec<DeliveryFailure>,
    /// The publication arrived while another gesture was being dispatched and
    /// was queued behind it
    pub deferred: bool,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.failures.extend(other.failures);
    }
}

type Gesture = (Option<SubscriberId>, Vec<SelectionEvent>);

/// Marks the bus as dispatching until dropped. A handler panic unwinds through
/// it: the flag is reset and the gestures queued behind the interrupted one are
/// dropped, so the next publication is delivered normally.
struct DispatchGuard<'a> {
    bus: &'a CorrelationBus,
}

impl<'a> DispatchGuard<'a> {
    fn enter(bus: &'a CorrelationBus) -> Self {
        bus.dispatching.set(true);
        Self { bus }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.bus.dispatching.set(false);
        let mut queue = self.bus.queue.borrow_mut();
        if !queue.is_empty() {
            warn!("Dropping {} selection gestures after a failed dispatch", queue.len());
            queue.clear();
        }
    }
}

/// Publish/subscribe relay keeping the selections of independent views in sync.
///
/// Publishers do not know who listens. Every event of a gesture reaches every
/// subscriber but its origin before the next gesture is dispatched: gestures
/// published from inside a handler are queued and delivered once the current
/// one is done. A failing handler never stops delivery to the others.
#[derive(Default)]
pub struct CorrelationBus {
    subscribers: Vec<(SubscriberId, Rc<RefCell<dyn SelectionHandler>>)>,
    next_id: usize,
    dispatching: Cell<bool>,
    queue: RefCell<VecDeque<Gesture>>,
}

impl CorrelationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: Rc<RefCell<dyn SelectionHandler>>) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        debug!("Subscribed {} as {}", handler.borrow().name(), id);
        self.subscribers.push((id, handler));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(s, _)| *s != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver one event to every subscriber except `origin`
    pub fn publish(&self, origin: Option<SubscriberId>, event: SelectionEvent) -> DispatchReport {
        self.publish_gesture(origin, vec![event])
    }

    /// Deliver the events of one user gesture, in order, to every subscriber
    /// except `origin`
    pub fn publish_gesture(
        &self,
        origin: Option<SubscriberId>,
        events: Vec<SelectionEvent>,
    ) -> DispatchReport {
        self.queue.borrow_mut().push_back((origin, events));
        if self.dispatching.get() {
            return DispatchReport {
                deferred: true,
                ..Default::default()
            };
        }

        let _guard = DispatchGuard::enter(self);
        let mut report = DispatchReport::default();
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some((origin, events)) = next else {
                break;
            };
            for event in &events {
                report.merge(self.deliver(origin, event));
            }
        }
        report
    }

    fn deliver(&self, origin: Option<SubscriberId>, event: &SelectionEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        for (id, handler) in &self.subscribers {
            if Some(*id) == origin {
                continue;
            }
            let result = match handler.try_borrow_mut() {
                Ok(mut handler) => match *event {
                    SelectionEvent::PointSelected { time, track } => {
                        handler.highlight_point(time, track)
                    }
                    SelectionEvent::IntervalSelected { low, high, track } => {
                        handler.highlight_interval(low, high, track)
                    }
                    SelectionEvent::SelectionCleared => handler.clear_selection(),
                },
                Err(_) => Err(EcolapError::ViewHandlerError {
                    view: id.to_string(),
                    reason: "view is busy".to_string(),
                }),
            };
            match result {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!("Subscriber {} failed to handle {:?}: {}", id, event, error);
                    report.failures.push(DeliveryFailure {
                        subscriber: *id,
                        error,
                    });
                }
            }
        }
        report
    }
}
