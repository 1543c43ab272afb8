//! Script-level stream scenarios.
//!
//! Each test runs a snippet that appends to a global `log` array, drains the
//! job queue, and compares `log.join('|')`.

use boa_engine::{Context, JsValue, Source};

use super::readable::{ReadableHandle, ReadableStream};
use super::writable::{WritableHandle, WritableStream};
use super::{EmptyReadPolicy, StreamConfig, StreamState, install_stream_api};

fn context_with(config: StreamConfig) -> Context {
    let mut ctx = Context::default();
    install_stream_api(&mut ctx, config).unwrap();
    ctx.eval(Source::from_bytes("globalThis.log = [];")).unwrap();
    ctx
}

fn run_in(ctx: &mut Context, script: &str) -> String {
    ctx.eval(Source::from_bytes(script)).unwrap();
    ctx.run_jobs().unwrap();
    let log = ctx.eval(Source::from_bytes("log.join('|')")).unwrap();
    log.to_string(ctx).unwrap().to_std_string_escaped()
}

fn run(script: &str) -> String {
    run_in(&mut context_with(StreamConfig::default()), script)
}

fn readable_handle(value: &JsValue) -> ReadableHandle {
    if let Some(object) = value.as_object() {
        if let Some(stream) = object.downcast_ref::<ReadableStream>() {
            return stream.handle().clone();
        }
    }
    panic!("not a ReadableStream");
}

fn writable_handle(value: &JsValue) -> WritableHandle {
    if let Some(object) = value.as_object() {
        if let Some(stream) = object.downcast_ref::<WritableStream>() {
            return stream.handle().clone();
        }
    }
    panic!("not a WritableStream");
}

// ============================================================================
// Readable
// ============================================================================

#[test]
fn test_start_enqueues_then_closes() {
    let log = run(
        r#"
        const rs = new ReadableStream({
            start(c) { c.enqueue('a'); c.enqueue('b'); c.close(); },
        });
        const r = rs.getReader();
        (async () => {
            for (;;) {
                const { value, done } = await r.read();
                log.push(done ? 'done' : value);
                if (done) break;
            }
        })();
        "#,
    );
    assert_eq!(log, "a|b|done");
}

#[test]
fn test_pending_read_is_fulfilled_by_later_enqueue() {
    let log = run(
        r#"
        let ctrl;
        const r = new ReadableStream({ start(c) { ctrl = c; } }).getReader();
        r.read().then(({ value, done }) => log.push(value + ':' + done));
        r.read().then(({ value, done }) => log.push(String(value) + ':' + done));
        log.push('queued');
        ctrl.enqueue('late');
        ctrl.close();
        "#,
    );
    assert_eq!(log, "queued|late:false|undefined:true");
}

#[test]
fn test_reject_policy_fails_empty_reads() {
    let mut ctx = context_with(StreamConfig::default().with_empty_read_policy(EmptyReadPolicy::Reject));
    let log = run_in(
        &mut ctx,
        r#"
        new ReadableStream().getReader().read().catch(e => log.push(e.name));
        const pulled = new ReadableStream({ pull(c) { c.enqueue('now'); } }, { highWaterMark: 0 });
        pulled.getReader().read().then(({ value }) => log.push(value));
        "#,
    );
    assert_eq!(log, "TypeError|now");
}

#[test]
fn test_enqueue_or_close_after_close_throws() {
    let log = run(
        r#"
        new ReadableStream({
            start(c) {
                c.close();
                try { c.enqueue('x'); } catch (e) { log.push(e.name); }
                try { c.close(); } catch (e) { log.push(e.name); }
            },
        });
        "#,
    );
    assert_eq!(log, "TypeError|TypeError");
}

#[test]
fn test_close_waits_for_queued_chunks() {
    let log = run(
        r#"
        let ctrl;
        const rs = new ReadableStream({ start(c) { ctrl = c; } }, { highWaterMark: 3 });
        ctrl.enqueue('one');
        ctrl.close();
        const r = rs.getReader();
        r.closed.then(() => log.push('closed'));
        r.read().then(({ value }) => log.push(value));
        "#,
    );
    // The final read closes the stream before its own promise exists.
    assert_eq!(log, "closed|one");
}

#[test]
fn test_readable_buffer_limit_errors_stream() {
    let mut ctx = context_with(StreamConfig::new(10));
    let log = run_in(
        &mut ctx,
        r#"
        let ctrl;
        const rs = new ReadableStream({ start(c) { ctrl = c; } });
        let thrown;
        try { ctrl.enqueue('12345678901'); } catch (e) { thrown = e; log.push(e.name); }
        rs.getReader().read().catch(e => log.push(e === thrown));
        try { ctrl.enqueue('a'); } catch (e) { log.push('again:' + e.name); }
        "#,
    );
    assert_eq!(log, "RangeError|again:TypeError|true");
}

#[test]
fn test_desired_size_follows_state() {
    let log = run(
        r#"
        let a, b, c;
        new ReadableStream({ start(ctrl) { a = ctrl; } }, { highWaterMark: 3 });
        log.push(a.desiredSize);
        a.enqueue('x');
        log.push(a.desiredSize);
        new ReadableStream({ start(ctrl) { b = ctrl; ctrl.close(); } });
        log.push(b.desiredSize);
        new ReadableStream({ start(ctrl) { c = ctrl; ctrl.error('x'); } });
        log.push(String(c.desiredSize));
        "#,
    );
    assert_eq!(log, "3|2|0|null");
}

#[test]
fn test_throwing_start_errors_stream() {
    let log = run(
        r#"
        const rs = new ReadableStream({ start() { throw new Error('no start'); } });
        rs.getReader().read().catch(e => log.push(e.message));
        "#,
    );
    assert_eq!(log, "no start");
}

#[test]
fn test_throwing_pull_errors_stream() {
    let log = run(
        r#"
        const rs = new ReadableStream({ pull() { throw new Error('no pull'); } }, { highWaterMark: 0 });
        const r = rs.getReader();
        r.read().catch(e => log.push('read:' + e.message));
        r.closed.catch(e => log.push('closed:' + e.message));
        "#,
    );
    assert_eq!(log, "read:no pull|closed:no pull");
}

#[test]
fn test_cancel_discards_queue_and_notifies_source() {
    let log = run(
        r#"
        const reasons = [];
        const rs = new ReadableStream({
            start(c) { c.enqueue('dropped'); },
            cancel(reason) { reasons.push(reason); },
        });
        const r = rs.getReader();
        r.cancel('enough').then(() => log.push('cancelled:' + reasons.join()));
        r.read().catch(e => log.push('read:' + e.name));
        log.push('locked:' + rs.locked);
        rs.getReader().read().then(({ done }) => log.push('done:' + done));
        "#,
    );
    assert_eq!(log, "locked:false|cancelled:enough|read:TypeError|done:true");
}

#[test]
fn test_queue_accounting_matches_chunk_sizes() {
    let mut ctx = context_with(StreamConfig::default());
    let value = ctx
        .eval(Source::from_bytes(
            r#"
            let ctrl;
            globalThis.rs = new ReadableStream({ start(c) { ctrl = c; } }, { highWaterMark: 10 });
            ctrl.enqueue('ab');
            ctrl.enqueue(new Uint8Array(16));
            ctrl.enqueue({ opaque: true });
            rs
            "#,
        ))
        .unwrap();
    let stream = readable_handle(&value);
    {
        let inner = stream.borrow();
        assert_eq!(inner.queue_len(), 3);
        assert_eq!(inner.queue_byte_size(), 2 + 16 + super::chunk::OPAQUE_CHUNK_ESTIMATE);
        assert!(inner.accounting_holds());
    }

    ctx.eval(Source::from_bytes("rs.getReader().read()")).unwrap();
    ctx.run_jobs().unwrap();
    let inner = stream.borrow();
    assert_eq!(inner.queue_byte_size(), 16 + super::chunk::OPAQUE_CHUNK_ESTIMATE);
    assert!(inner.accounting_holds());
    assert!(inner.is_locked());
}

#[test]
fn test_error_discards_queue() {
    let mut ctx = context_with(StreamConfig::default());
    let value = ctx
        .eval(Source::from_bytes(
            "new ReadableStream({ start(c) { c.enqueue('a'); c.enqueue('b'); c.error('stop'); } })",
        ))
        .unwrap();
    let stream = readable_handle(&value);
    let inner = stream.borrow();
    assert_eq!(inner.state(), StreamState::Errored);
    assert_eq!(inner.queue_len(), 0);
    assert_eq!(inner.queue_byte_size(), 0);
    assert_eq!(inner.pending_read_count(), 0);
}

// ============================================================================
// Locks
// ============================================================================

#[test]
fn test_reader_lock_lifecycle() {
    let log = run(
        r#"
        const rs = new ReadableStream();
        const r = rs.getReader();
        log.push(rs.locked);
        try { rs.getReader(); } catch (e) { log.push(e.name); }
        r.releaseLock();
        r.releaseLock();
        log.push(rs.locked);
        const again = new ReadableStreamDefaultReader(rs);
        log.push(rs.locked);
        "#,
    );
    assert_eq!(log, "true|TypeError|false|true");
}

#[test]
fn test_release_lock_rejects_pending_reads() {
    let log = run(
        r#"
        const r = new ReadableStream().getReader();
        r.read().catch(e => log.push('read:' + e.name));
        r.closed.catch(e => log.push('closed:' + e.name));
        r.releaseLock();
        r.read().catch(e => log.push('after:' + e.name));
        "#,
    );
    assert_eq!(log, "read:TypeError|closed:TypeError|after:TypeError");
}

#[test]
fn test_writer_lock_lifecycle() {
    let log = run(
        r#"
        const ws = new WritableStream();
        const w = ws.getWriter();
        log.push(ws.locked);
        try { ws.getWriter(); } catch (e) { log.push(e.name); }
        w.releaseLock();
        w.releaseLock();
        log.push(ws.locked);
        try { w.desiredSize; } catch (e) { log.push('detached:' + e.name); }
        new WritableStreamDefaultWriter(ws);
        log.push(ws.locked);
        "#,
    );
    assert_eq!(log, "true|TypeError|false|detached:TypeError|true");
}

// ============================================================================
// Writable
// ============================================================================

#[test]
fn test_write_then_close_reaches_sink() {
    let log = run(
        r#"
        const sink = [];
        const w = new WritableStream({ write(chunk) { sink.push(chunk); } }).getWriter();
        w.write('x');
        w.close();
        w.closed.then(() => log.push('closed:' + sink.join(',')));
        "#,
    );
    assert_eq!(log, "closed:x");
}

#[test]
fn test_sink_close_runs_once_after_writes() {
    let log = run(
        r#"
        const w = new WritableStream({
            write(chunk) { log.push('write:' + chunk); },
            close() { log.push('close'); },
        }).getWriter();
        w.write('1');
        w.write('2');
        w.close().then(() => log.push('done'));
        "#,
    );
    assert_eq!(log, "write:1|write:2|close|done");
}

#[test]
fn test_write_after_close_rejects() {
    let log = run(
        r#"
        const w = new WritableStream().getWriter();
        w.close();
        w.write('x').catch(e => log.push(e.name));
        w.close().catch(e => log.push(e.name));
        "#,
    );
    assert_eq!(log, "TypeError|TypeError");
}

#[test]
fn test_writable_buffer_limit_errors_stream() {
    let mut ctx = context_with(StreamConfig::new(10));
    let log = run_in(
        &mut ctx,
        r#"
        const w = new WritableStream({ write() {} }).getWriter();
        (async () => {
            let first;
            try { await w.write('12345678901'); } catch (e) { first = e; log.push(e.name); }
            try { await w.write('a'); } catch (e) { log.push(e === first); }
            try { await w.closed; } catch (e) { log.push(e === first); }
        })();
        "#,
    );
    assert_eq!(log, "RangeError|true|true");
}

#[test]
fn test_sink_throw_errors_stream() {
    let log = run(
        r#"
        const w = new WritableStream({
            write(chunk) { if (chunk === 'bad') throw new Error('sink failed'); },
        }).getWriter();
        (async () => {
            await w.write('good');
            log.push('good');
            try { await w.write('bad'); } catch (e) { log.push(e.message); }
            try { await w.closed; } catch (e) { log.push('closed:' + e.message); }
            try { await w.write('more'); } catch (e) { log.push('more:' + e.message); }
        })();
        "#,
    );
    assert_eq!(log, "good|sink failed|closed:sink failed|more:sink failed");
}

#[test]
fn test_sink_throw_rejects_writes_queued_behind_it() {
    let mut ctx = context_with(StreamConfig::default());
    let value = ctx
        .eval(Source::from_bytes(
            r#"
            let w;
            const ws = new WritableStream({
                write(chunk) {
                    if (chunk === 'a') {
                        w.write('b').catch(e => log.push('b:' + e.message));
                        w.write('c').catch(e => log.push('c:' + e.message));
                        throw new Error('boom');
                    }
                    log.push('sink:' + chunk);
                },
            });
            w = ws.getWriter();
            w.write('a').catch(e => log.push('a:' + e.message));
            ws
            "#,
        ))
        .unwrap();
    ctx.run_jobs().unwrap();

    let log = ctx.eval(Source::from_bytes("log.join('|')")).unwrap();
    assert_eq!(
        log.to_string(&mut ctx).unwrap().to_std_string_escaped(),
        "b:boom|c:boom|a:boom"
    );

    let stream = writable_handle(&value);
    let inner = stream.borrow();
    assert_eq!(inner.state(), StreamState::Errored);
    assert_eq!(inner.queue_len(), 0);
    assert_eq!(inner.queue_byte_size(), 0);
    assert!(inner.accounting_holds());
}

#[test]
fn test_backpressure_replaces_and_resolves_ready() {
    let log = run(
        r#"
        let w;
        const during = [];
        const ws = new WritableStream({
            write(chunk) {
                if (chunk === 'first') {
                    w.write('second');
                    w.write('third');
                    during.push(w.desiredSize);
                }
            },
        });
        w = ws.getWriter();
        const readyBefore = w.ready;
        w.write('first');
        log.push(during[0], w.desiredSize, readyBefore !== w.ready);
        w.ready.then(() => log.push('ready'));
        "#,
    );
    assert_eq!(log, "-2|1|true|ready");
}

#[test]
fn test_abort_errors_stream_and_notifies_sink() {
    let log = run(
        r#"
        const reasons = [];
        const w = new WritableStream({ abort(reason) { reasons.push(reason); } }).getWriter();
        w.abort('stop').then(() => log.push('aborted:' + reasons.join()));
        w.write('x').catch(e => log.push('write:' + e));
        "#,
    );
    assert_eq!(log, "aborted:stop|write:stop");
}

#[test]
fn test_controller_error_rejects_later_writes() {
    let mut ctx = context_with(StreamConfig::default());
    let value = ctx
        .eval(Source::from_bytes(
            r#"
            let ctrl;
            globalThis.ws = new WritableStream({ start(c) { ctrl = c; } });
            ctrl.error(new Error('sink gone'));
            ws.getWriter().write('x').catch(e => log.push(e.message));
            ws
            "#,
        ))
        .unwrap();
    ctx.run_jobs().unwrap();

    let stream = writable_handle(&value);
    assert_eq!(stream.borrow().state(), StreamState::Errored);
    assert!(stream.borrow().accounting_holds());
    let log = ctx.eval(Source::from_bytes("log.join('|')")).unwrap();
    assert_eq!(log.to_string(&mut ctx).unwrap().to_std_string_escaped(), "sink gone");
}

// ============================================================================
// Transform
// ============================================================================

#[test]
fn test_identity_transform_passes_chunks_through() {
    let log = run(
        r#"
        const ts = new TransformStream();
        const w = ts.writable.getWriter();
        const r = ts.readable.getReader();
        w.write('p');
        w.close();
        (async () => {
            const a = await r.read();
            const b = await r.read();
            log.push(a.value, b.done);
        })();
        "#,
    );
    assert_eq!(log, "p|true");
}

#[test]
fn test_transform_and_flush() {
    let log = run(
        r#"
        const ts = new TransformStream({
            transform(chunk, c) { c.enqueue(chunk.length); },
            flush(c) { c.enqueue('end'); },
        });
        const w = ts.writable.getWriter();
        const r = ts.readable.getReader();
        w.write('abc');
        w.write('de');
        w.close();
        (async () => {
            for (;;) {
                const { value, done } = await r.read();
                if (done) break;
                log.push(value);
            }
        })();
        "#,
    );
    assert_eq!(log, "3|2|end");
}

#[test]
fn test_terminate_closes_readable_and_errors_writable() {
    let log = run(
        r#"
        let tc;
        const ts = new TransformStream({ start(c) { tc = c; } });
        const w = ts.writable.getWriter();
        const r = ts.readable.getReader();
        tc.enqueue('last');
        tc.terminate();
        (async () => {
            log.push((await r.read()).value);
            log.push((await r.read()).done);
            try { await w.write('late'); } catch (e) { log.push(e.name + ':' + e.message); }
        })();
        "#,
    );
    assert_eq!(log, "last|true|TypeError:TransformStream is terminated");
}

#[test]
fn test_controller_error_errors_both_sides() {
    let log = run(
        r#"
        const ts = new TransformStream({ transform(chunk, c) { c.error(new Error('bad chunk')); } });
        const w = ts.writable.getWriter();
        const r = ts.readable.getReader();
        (async () => {
            try { await w.write('x'); } catch (e) { log.push('write:' + e.message); }
            try { await r.read(); } catch (e) { log.push('read:' + e.message); }
        })();
        "#,
    );
    assert_eq!(log, "write:bad chunk|read:bad chunk");
}

#[test]
fn test_throwing_transform_errors_both_sides() {
    let log = run(
        r#"
        const ts = new TransformStream({ transform() { throw new Error('cannot'); } });
        const w = ts.writable.getWriter();
        const r = ts.readable.getReader();
        let written;
        w.write('x').catch(e => { written = e; log.push('write:' + e.message); });
        r.read().catch(e => log.push('same:' + (e === written)));
        "#,
    );
    assert_eq!(log, "write:cannot|same:true");
}

#[test]
fn test_abort_and_cancel_cross_sides() {
    let log = run(
        r#"
        const ts = new TransformStream();
        const r = ts.readable.getReader();
        ts.writable.abort('gone');
        r.read().catch(e => log.push('read:' + e));

        const ts2 = new TransformStream();
        const w2 = ts2.writable.getWriter();
        ts2.readable.cancel('closed');
        w2.write('x').catch(e => log.push('write:' + e));
        "#,
    );
    assert_eq!(log, "read:gone|write:closed");
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_unsupported_and_invalid_construction() {
    let log = run(
        r#"
        const attempts = [
            () => new ReadableStream().tee(),
            () => new ReadableStream({ type: 'bytes' }),
            () => new ReadableStream().getReader({ mode: 'byob' }),
            () => new ReadableStreamDefaultController(),
            () => new WritableStream({ type: 'x' }),
            () => new ReadableStream({}, { highWaterMark: -1 }),
            () => new TransformStream({ readableType: 'bytes' }),
            () => new ReadableStream({ pull: 42 }),
        ];
        for (const attempt of attempts) {
            try { attempt(); log.push('ok'); } catch (e) { log.push(e.name); }
        }
        "#,
    );
    assert_eq!(
        log,
        "TypeError|TypeError|TypeError|TypeError|RangeError|RangeError|RangeError|TypeError"
    );
}

#[test]
fn test_method_arities() {
    let log = run(
        r#"
        log.push(
            ReadableStreamDefaultReader.length,
            WritableStreamDefaultWriter.length,
            ReadableStream.prototype.getReader.length,
            WritableStreamDefaultWriter.prototype.write.length,
            ReadableStreamDefaultController.prototype.enqueue.length,
        );
        "#,
    );
    assert_eq!(log, "1|1|0|1|1");
}
