/// Local asset pipeline
///
/// This module handles:
/// - Naming copies and thumbnails after their source path
/// - Copying user images into the managed copies directory
/// - Generating thumbnails
/// - Cleaning up copies and thumbnails that no entry references
/// - Running thumbnail work off the control thread

pub mod copies;
pub mod lifecycle;
pub mod naming;
pub mod oplog;
pub mod thumbnail;
pub mod worker;
