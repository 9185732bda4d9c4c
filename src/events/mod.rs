//! # Events Module
//!
//! Progress reporting for whatever drives the pipeline.
//!
//! ## Design
//! Stage workers emit events through channels, so a CLI progress bar,
//! a GUI or a test can subscribe without the pipeline knowing which.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         match event {
//!             Event::Lookup(LookupEvent::NotFound { locator, .. }) => println!("{}", locator),
//!             Event::Action(ActionEvent::Processed { path }) => println!("done {:?}", path),
//!             _ => {}
//!         }
//!     }
//! });
//!
//! let pipeline = Pipeline::builder().events(sender).build(session);
//! ```

mod channel;
mod types;

pub use channel::{EventChannel, EventReceiver, EventSender, null_sender};
pub use types::*;
