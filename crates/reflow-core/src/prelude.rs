pub use crate::effects::Dispose;
pub use crate::error::FlowError;
pub use crate::flow::{Flow, ObserverId, flow};
pub use crate::graph::NodeId;
pub use crate::lifecycle::{Lifecycle, LifecycleOwner};
pub use crate::observer::{CallbackObserver, Observer, observer};
pub use crate::scheduler::{Clock, ManualClock, SystemClock, TaskHandle};
pub use crate::throttle::ThrottleObserver;
