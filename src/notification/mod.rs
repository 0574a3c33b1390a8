pub mod compose;
pub mod mailer;
pub mod model;
