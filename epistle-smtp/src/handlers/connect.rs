use async_trait::async_trait;

use epistle_core::{
    error::HandlerError,
    handler::ConnectHandler,
    response::Response,
    session::Session,
};

use crate::status::{Status, reply};

/// Emits the `220` service greeting when a connection is accepted.
pub struct ServiceGreeting;

#[async_trait]
impl ConnectHandler for ServiceGreeting {
    async fn on_connect(&self, session: &mut Session) -> Result<Option<Response>, HandlerError> {
        let greeting = format!(
            "{} ESMTP {}",
            session.policy().hello_name(),
            session.policy().greeting()
        );

        Ok(Some(reply(Status::ServiceReady, greeting)))
    }
}
