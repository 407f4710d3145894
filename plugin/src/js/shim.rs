//! Script-side prelude.

/// Builds `_wsExt` over the native functions, plus the hidden
/// `__ws_ext_dispatch` entry point used to raise events on its channels.
pub(crate) const EXT_PRELUDE: &str = r#"
(function() {
    function Channel(name) {
        this._name = name;
        this._slots = [];
    }

    Channel.prototype.connect = function(slot) {
        this._slots.push(slot);
    };

    Channel.prototype.disconnect = function(slot) {
        var idx = this._slots.indexOf(slot);
        if (idx !== -1) this._slots.splice(idx, 1);
    };

    Channel.prototype.emit = function() {
        var slots = this._slots.slice();
        for (var i = 0; i < slots.length; i++) {
            try {
                slots[i].apply(null, arguments);
            } catch (e) {
                console.error('[_wsExt] ' + this._name + ' slot error:', e);
            }
        }
    };

    var ext = {
        connect: function(url) { return __ws_connect(String(url)); },
        send_to_server: function(id, data) { __ws_send_to_server(id, String(data)); },
        client_close: function(id) { __ws_client_close(id); },
        onopen: new Channel('onopen'),
        onmessage: new Channel('onmessage'),
        onclose: new Channel('onclose')
    };

    globalThis._wsExt = ext;

    // [channel, id, data?]
    globalThis.__ws_ext_dispatch = function(event) {
        var channel = ext[event[0]];
        if (!channel) return;
        if (event.length > 2) {
            channel.emit(event[1], event[2]);
        } else {
            channel.emit(event[1]);
        }
    };
})();
"#;

/// Browser-style `WebSocket` built only on `_wsExt`.
pub(crate) const WEBSOCKET_SHIM: &str = r#"
(function(ext) {
    var CONNECTING = 0, OPEN = 1, CLOSING = 2, CLOSED = 3;
    var sockets = {};

    function fire(ws, type, extra) {
        var event = { type: type, target: ws };
        if (extra) {
            for (var key in extra) event[key] = extra[key];
        }

        var handler = ws['on' + type];
        if (typeof handler === 'function') {
            try { handler.call(ws, event); } catch (e) { console.error('[WebSocket] on' + type + ' error:', e); }
        }

        var listeners = (ws._listeners[type] || []).slice();
        for (var i = 0; i < listeners.length; i++) {
            try { listeners[i].call(ws, event); } catch (e) { console.error('[WebSocket] listener error:', e); }
        }
    }

    function finish(ws) {
        if (ws.readyState === CLOSED) return;
        ws.readyState = CLOSED;
        delete sockets[ws._id];
        fire(ws, 'close', { code: 1000, reason: '', wasClean: true });
    }

    function WebSocket(url) {
        if (!(this instanceof WebSocket)) {
            throw new TypeError("Failed to construct 'WebSocket': Please use the 'new' operator");
        }
        this.url = String(url);
        this.readyState = CONNECTING;
        this.onopen = null;
        this.onmessage = null;
        this.onclose = null;
        this._listeners = {};
        this._id = ext.connect(this.url);
        sockets[this._id] = this;
    }

    WebSocket.CONNECTING = WebSocket.prototype.CONNECTING = CONNECTING;
    WebSocket.OPEN = WebSocket.prototype.OPEN = OPEN;
    WebSocket.CLOSING = WebSocket.prototype.CLOSING = CLOSING;
    WebSocket.CLOSED = WebSocket.prototype.CLOSED = CLOSED;

    WebSocket.prototype.send = function(data) {
        if (this.readyState === CONNECTING) {
            throw new Error("Failed to execute 'send' on 'WebSocket': Still in CONNECTING state.");
        }
        if (this.readyState !== OPEN) return;
        ext.send_to_server(this._id, data);
    };

    WebSocket.prototype.close = function() {
        if (this.readyState === CLOSING || this.readyState === CLOSED) return;
        this.readyState = CLOSING;
        ext.client_close(this._id);
        var ws = this;
        Promise.resolve().then(function() { finish(ws); });
    };

    WebSocket.prototype.addEventListener = function(type, listener) {
        if (!this._listeners[type]) this._listeners[type] = [];
        this._listeners[type].push(listener);
    };

    WebSocket.prototype.removeEventListener = function(type, listener) {
        var list = this._listeners[type];
        if (!list) return;
        var idx = list.indexOf(listener);
        if (idx !== -1) list.splice(idx, 1);
    };

    ext.onopen.connect(function(id) {
        var ws = sockets[id];
        if (!ws || ws.readyState !== CONNECTING) return;
        ws.readyState = OPEN;
        fire(ws, 'open');
    });

    ext.onmessage.connect(function(id, data) {
        var ws = sockets[id];
        if (!ws || ws.readyState !== OPEN) return;
        fire(ws, 'message', { data: data });
    });

    ext.onclose.connect(function(id) {
        var ws = sockets[id];
        if (ws) finish(ws);
    });

    globalThis.WebSocket = WebSocket;
})(globalThis._wsExt);
"#;
