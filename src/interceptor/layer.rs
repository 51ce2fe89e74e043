use super::{AdmissionInterceptor, FailureClassifier, PermitGuard};
use crate::circuit_breaker::Outcome;
use crate::error::InterceptError;
use futures::future::{self, BoxFuture};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer wrapping services with an [`AdmissionInterceptor`]
pub struct AdmissionLayer<C> {
    interceptor: AdmissionInterceptor<C>,
}

impl<C> AdmissionLayer<C> {
    pub fn new(interceptor: AdmissionInterceptor<C>) -> Self {
        Self { interceptor }
    }
}

impl<C> Clone for AdmissionLayer<C> {
    fn clone(&self) -> Self {
        Self {
            interceptor: self.interceptor.clone(),
        }
    }
}

impl<S, C> Layer<S> for AdmissionLayer<C> {
    type Service = AdmissionService<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

/// Service produced by [`AdmissionLayer`]
pub struct AdmissionService<S, C> {
    inner: S,
    interceptor: AdmissionInterceptor<C>,
}

impl<S: Clone, C> Clone for AdmissionService<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            interceptor: self.interceptor.clone(),
        }
    }
}

impl<S, C> AdmissionService<S, C> {
    pub fn interceptor(&self) -> &AdmissionInterceptor<C> {
        &self.interceptor
    }
}

impl<S, C, Req> Service<Req> for AdmissionService<S, C>
where
    S: Service<Req>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    C: FailureClassifier<S::Response, S::Error> + 'static,
{
    type Response = S::Response;
    type Error = InterceptError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(InterceptError::Handler)
    }

    fn call(&mut self, request: Req) -> Self::Future {
        let breaker = self.interceptor.breaker();
        let permit = match breaker.allow() {
            Ok(permit) => permit,
            Err(rejection) => return Box::pin(future::ready(Err(rejection.into()))),
        };

        let guard = PermitGuard::new(breaker.clone(), permit);
        let classifier = self.interceptor.classifier().clone();
        let response = self.inner.call(request);

        Box::pin(async move {
            let result = response.await;
            guard.complete(Outcome::from_failure(classifier.is_failure(&result)));
            result.map_err(InterceptError::Handler)
        })
    }
}
