//! Remote API seam.
//!
//! The guard and the engine depend on [`VoteApi`] rather than on the HTTP
//! client directly, so tests can script server behaviour without a socket.

use std::future::Future;
use std::pin::Pin;

use evote_api::VoteClient;
use evote_types::{ApiError, AuthToken, Credential, EventDetail, EventId, EventResults};

pub type ApiFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

pub trait VoteApi: Send + Sync {
    fn sign_in<'a>(&'a self, email: &'a str, password: &'a str) -> ApiFut<'a, Credential>;
    fn register<'a>(
        &'a self,
        name: &'a str,
        email: &'a str,
        password: &'a str,
    ) -> ApiFut<'a, Credential>;
    fn get_event<'a>(
        &'a self,
        token: &'a AuthToken,
        event_id: &'a EventId,
    ) -> ApiFut<'a, EventDetail>;
    fn cast_vote<'a>(
        &'a self,
        token: &'a AuthToken,
        event_id: &'a EventId,
        option_name: &'a str,
    ) -> ApiFut<'a, ()>;
    fn get_results<'a>(
        &'a self,
        token: &'a AuthToken,
        event_id: &'a EventId,
    ) -> ApiFut<'a, EventResults>;
}

impl VoteApi for VoteClient {
    fn sign_in<'a>(&'a self, email: &'a str, password: &'a str) -> ApiFut<'a, Credential> {
        Box::pin(VoteClient::sign_in(self, email, password))
    }

    fn register<'a>(
        &'a self,
        name: &'a str,
        email: &'a str,
        password: &'a str,
    ) -> ApiFut<'a, Credential> {
        Box::pin(VoteClient::register(self, name, email, password))
    }

    fn get_event<'a>(
        &'a self,
        token: &'a AuthToken,
        event_id: &'a EventId,
    ) -> ApiFut<'a, EventDetail> {
        Box::pin(VoteClient::get_event(self, token, event_id))
    }

    fn cast_vote<'a>(
        &'a self,
        token: &'a AuthToken,
        event_id: &'a EventId,
        option_name: &'a str,
    ) -> ApiFut<'a, ()> {
        Box::pin(VoteClient::cast_vote(self, token, event_id, option_name))
    }

    fn get_results<'a>(
        &'a self,
        token: &'a AuthToken,
        event_id: &'a EventId,
    ) -> ApiFut<'a, EventResults> {
        Box::pin(VoteClient::get_results(self, token, event_id))
    }
}
