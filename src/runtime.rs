use std::{future::Future, time::Duration};

#[cfg(not(any(feature = "tokio", feature = "smol")))]
compile_error!("quotagate needs an async runtime: enable the `tokio` or `smol` feature");

#[cfg(feature = "tokio")]
pub(crate) type Interval = tokio::time::Interval;

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) type Interval = smol::Timer;

#[cfg(feature = "tokio")]
pub(crate) fn new_interval(period: Duration) -> Interval {
    tokio::time::interval(period)
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) fn new_interval(period: Duration) -> Interval {
    smol::Timer::interval(period)
}

#[cfg(feature = "tokio")]
pub(crate) fn spawn_task<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(fut);
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) fn spawn_task<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    smol::spawn(fut).detach();
}

#[cfg(feature = "tokio")]
pub(crate) async fn tick(interval: &mut Interval) {
    interval.tick().await;
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) async fn tick(interval: &mut Interval) {
    use futures::StreamExt;
    interval.next().await;
}

/// The deadline passed before the future completed.
#[derive(Debug)]
pub(crate) struct Elapsed;

#[cfg(feature = "tokio")]
pub(crate) async fn timeout<F>(duration: Duration, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    tokio::time::timeout(duration, fut).await.map_err(|_| Elapsed)
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) async fn timeout<F>(duration: Duration, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    use futures::future::{Either, select};

    let fut = std::pin::pin!(fut);

    match select(fut, smol::Timer::after(duration)).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(_) => Err(Elapsed),
    }
}
