use frameconv::{
    to_async_writer, to_string, AsyncSequence, CancellationToken, ConvertOptions, Error,
    StreamSerializer,
};
use futures_lite::{future, stream, Stream};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

/// Element source released by hand from the test body.
#[derive(Clone, Default)]
struct Gate {
    items: Rc<RefCell<VecDeque<u32>>>,
    closed: Rc<Cell<bool>>,
    dropped: Rc<Cell<bool>>,
    polls: Rc<Cell<usize>>,
}

struct GateStream(Gate);

impl Gate {
    fn push(&self, item: u32) {
        self.items.borrow_mut().push_back(item);
    }

    fn close(&self) {
        self.closed.set(true);
    }

    fn sequence(&self) -> AsyncSequence<u32> {
        AsyncSequence::new(GateStream(self.clone()))
    }
}

impl Stream for GateStream {
    type Item = frameconv::Result<u32>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let gate = &self.0;
        gate.polls.set(gate.polls.get() + 1);
        if let Some(item) = gate.items.borrow_mut().pop_front() {
            return Poll::Ready(Some(Ok(item)));
        }
        if gate.closed.get() {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

impl Drop for GateStream {
    fn drop(&mut self) {
        self.0.dropped.set(true);
    }
}

#[derive(Default)]
struct CountingWake(AtomicUsize);

impl Wake for CountingWake {
    fn wake(self: Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_pending_element_emits_nothing() {
    let gate = Gate::default();
    let sequence = gate.sequence();
    let mut serializer = StreamSerializer::new(&sequence, ConvertOptions::default()).unwrap();
    let waker = Waker::from(Arc::new(CountingWake::default()));
    let mut cx = Context::from_waker(&waker);

    assert!(serializer.poll_write(&mut cx).is_pending());
    assert!(serializer.is_pending_async());
    assert_eq!(serializer.pending_bytes(), 0);

    gate.push(1);
    gate.push(2);
    assert!(matches!(serializer.poll_write(&mut cx), Poll::Ready(Ok(false))));
    assert_eq!(serializer.take_output(), b"[1,2");
    assert!(serializer.poll_write(&mut cx).is_pending());

    gate.close();
    assert!(matches!(serializer.poll_write(&mut cx), Poll::Ready(Ok(true))));
    assert_eq!(serializer.take_output(), b"]");
    assert!(serializer.is_done());
}

#[test]
fn test_resume_does_not_refetch() {
    let gate = Gate::default();
    let sequence = gate.sequence();
    let mut serializer = StreamSerializer::new(&sequence, ConvertOptions::default()).unwrap();
    let waker = Waker::from(Arc::new(CountingWake::default()));
    let mut cx = Context::from_waker(&waker);

    assert!(serializer.poll_write(&mut cx).is_pending());
    assert_eq!(gate.polls.get(), 1);
    gate.push(5);
    gate.close();
    assert!(matches!(serializer.poll_write(&mut cx), Poll::Ready(Ok(true))));
    assert_eq!(gate.polls.get(), 3);
    assert_eq!(serializer.take_output(), b"[5]");
}

#[test]
fn test_cancellation_wakes_and_drops_source() {
    let gate = Gate::default();
    let sequence = gate.sequence();
    let token = CancellationToken::new();
    let wake = Arc::new(CountingWake::default());
    let waker = Waker::from(wake.clone());
    let mut cx = Context::from_waker(&waker);
    let mut sink = Vec::new();

    {
        let options = ConvertOptions::default();
        let write = to_async_writer(&mut sink, &sequence, &options, Some(token.clone()));
        futures_lite::pin!(write);
        assert!(write.as_mut().poll(&mut cx).is_pending());
        assert!(!gate.dropped.get());

        token.cancel();
        assert_eq!(wake.0.load(Ordering::SeqCst), 1);
        match write.as_mut().poll(&mut cx) {
            Poll::Ready(Err(err)) => assert!(matches!(err.inner(), Error::Cancelled)),
            _ => panic!("expected the write to fail with a cancellation"),
        }
        assert!(gate.dropped.get());
    }
    assert!(sink.is_empty());
}

#[test]
fn test_failing_source_leaves_output_untouched() {
    let sequence: AsyncSequence<u32> =
        AsyncSequence::new(stream::iter(vec![Err(Error::custom("source failed"))]));
    let mut sink = Vec::new();
    let err = future::block_on(to_async_writer(&mut sink, &sequence, &ConvertOptions::default(), None))
        .unwrap_err();
    assert!(err.to_string().contains("source failed"));
    assert!(sink.is_empty());
}

#[test]
fn test_consumed_sequence_cannot_be_written_again() {
    let sequence: AsyncSequence<u8> = vec![1].into_iter().collect();
    assert_eq!(to_string(&sequence).unwrap(), "[1]");
    assert!(to_string(&sequence).is_err());
}

#[test]
fn test_reading_buffers_elements() {
    let sequence: AsyncSequence<String> = frameconv::from_str(r#"["a", "b"]"#).unwrap();
    let items: Vec<String> = future::block_on(async {
        use futures_lite::StreamExt;
        sequence.into_stream().map(|item| item.unwrap()).collect().await
    });
    assert_eq!(items, vec!["a".to_string(), "b".to_string()]);
}
