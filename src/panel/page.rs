//! The panel page
//!
//! The transcript is rendered server-side; the script only posts bridge
//! messages, swaps in the rendered HTML and shows notifications.

/// HTML chat page
pub const PANEL_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>MATLAB Troubleshooter</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #1e1e1e;
            color: #e8e8e8;
            height: 100vh;
            display: flex;
            flex-direction: column;
        }
        .header {
            display: flex;
            justify-content: space-between;
            align-items: center;
            padding: 0.75rem 1rem;
            background: #333333;
            border-bottom: 1px solid #474747;
        }
        .header h1 { font-size: 1.1rem; color: #ffffff; }
        .header .status { font-size: 0.8rem; color: #888; }
        #chat-container {
            flex: 1;
            overflow-y: auto;
            padding: 1rem;
        }
        .message {
            max-width: 85%;
            margin-bottom: 0.75rem;
            padding: 0.6rem 0.9rem;
            border-radius: 8px;
            line-height: 1.4;
        }
        .user-message { background: #0e639c; color: #fff; margin-left: auto; }
        .bot-message { background: #2d2d2d; border: 1px solid #474747; }
        .bot-message.error { border-color: #ff4444; color: #ff9999; }
        .message-content h1, .message-content h2, .message-content h3 { margin: 0.4rem 0; }
        .code-block {
            background: #1e1e1e;
            color: #d4d4d4;
            padding: 0.5rem;
            border-radius: 4px;
            overflow-x: auto;
            margin: 0.4rem 0;
        }
        code { font-family: Consolas, 'Courier New', monospace; }
        .sources { margin-top: 0.5rem; font-size: 0.8rem; color: #aaa; }
        .improved-tag {
            display: inline-block;
            margin-top: 0.4rem;
            padding: 0.1rem 0.5rem;
            font-size: 0.75rem;
            background: #00aa55;
            color: #fff;
            border-radius: 10px;
        }
        .message-feedback { margin-top: 0.4rem; }
        .feedback-button {
            background: none;
            border: none;
            cursor: pointer;
            font-size: 1rem;
            opacity: 0.7;
            margin-right: 0.3rem;
        }
        .feedback-button.chosen { opacity: 1; transform: scale(1.2); }
        .feedback-button.disabled { opacity: 0.3; pointer-events: none; }
        .feedback-message { margin-top: 0.4rem; font-size: 0.8rem; color: #aaa; }
        .feedback-input-container { display: flex; gap: 0.4rem; margin-top: 0.4rem; }
        .feedback-text-input { flex: 1; padding: 0.3rem; background: #1e1e1e; color: #e8e8e8; border: 1px solid #474747; }
        .loading span { margin-left: 0.5rem; font-size: 0.85rem; color: #aaa; }
        .dot-flashing {
            display: inline-block;
            width: 8px; height: 8px;
            border-radius: 4px;
            background: #0e639c;
            animation: flash 1s infinite alternate;
        }
        @keyframes flash { from { opacity: 1; } to { opacity: 0.2; } }
        .input-row {
            display: flex;
            gap: 0.5rem;
            padding: 0.75rem 1rem;
            border-top: 1px solid #474747;
        }
        #user-input {
            flex: 1;
            padding: 0.5rem;
            background: #2d2d2d;
            color: #e8e8e8;
            border: 1px solid #474747;
            border-radius: 4px;
        }
        button.primary {
            padding: 0.5rem 1rem;
            background: #0e639c;
            color: #fff;
            border: none;
            border-radius: 4px;
            cursor: pointer;
        }
        button.primary:disabled { opacity: 0.5; cursor: default; }
        #toasts { position: fixed; top: 3.5rem; right: 1rem; width: 320px; }
        .toast {
            margin-bottom: 0.5rem;
            padding: 0.5rem 0.75rem;
            border-radius: 4px;
            background: #333;
            border-left: 4px solid #0e639c;
            font-size: 0.85rem;
        }
        .toast.error { border-left-color: #ff4444; }
    </style>
</head>
<body>
    <div class="header">
        <h1>MATLAB Troubleshooter</h1>
        <span class="status" id="helper-status">helper: idle</span>
        <button class="primary" id="close-button">Close</button>
    </div>

    <div id="chat-container"></div>

    <div class="input-row">
        <input type="text" id="user-input" placeholder="Describe your MATLAB error...">
        <button class="primary" id="send-button">Send</button>
    </div>

    <div id="toasts"></div>

    <script>
        const chat = document.getElementById('chat-container');
        const input = document.getElementById('user-input');
        const sendButton = document.getElementById('send-button');
        const shownNotices = new Set();
        let inFlight = false;
        let lastHtml = '';

        async function post(message) {
            const res = await fetch('/api/message', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify(message)
            });
            return res.ok ? res.json() : null;
        }

        function setBusy(busy) {
            inFlight = busy;
            input.disabled = busy;
            sendButton.disabled = busy;
        }

        function showNotice(notice) {
            if (shownNotices.has(notice.id)) return;
            shownNotices.add(notice.id);
            const toast = document.createElement('div');
            toast.className = 'toast ' + notice.level;
            toast.textContent = notice.text;
            document.getElementById('toasts').appendChild(toast);
            setTimeout(() => toast.remove(), 5000);
        }

        async function refresh() {
            try {
                const res = await fetch('/api/transcript');
                const data = await res.json();
                data.notices.forEach(showNotice);
                document.getElementById('helper-status').textContent = 'helper: ' + data.phase;
                // Keep an open improvement box intact
                if (data.html !== lastHtml && !chat.querySelector('.feedback-input-container')) {
                    lastHtml = data.html;
                    chat.innerHTML = data.html;
                    chat.scrollTop = chat.scrollHeight;
                }
            } catch (err) {
                console.error('Error fetching transcript:', err);
            }
        }

        async function run(message) {
            setBusy(true);
            const pending = post(message);
            setTimeout(refresh, 100);
            try {
                await pending;
            } finally {
                setBusy(false);
                await refresh();
                input.focus();
            }
        }

        function sendMessage() {
            const text = input.value.trim();
            if (!text || inFlight) return;
            input.value = '';
            run({ command: 'askQuestion', text: text });
        }

        function provideFeedback(messageDiv, isPositive) {
            const messageId = messageDiv.getAttribute('data-message-id');
            const content = messageDiv.querySelector('.message-content').textContent;
            messageDiv.querySelectorAll('.feedback-button').forEach(b => b.classList.add('disabled'));

            const note = document.createElement('div');
            note.className = 'feedback-message';
            note.textContent = isPositive
                ? 'Thanks for your feedback!'
                : 'Thanks for your feedback. How can I improve my answer?';
            messageDiv.appendChild(note);

            post({ command: 'feedback', messageId: messageId, isPositive: isPositive, content: content });
            if (isPositive) return;

            const box = document.createElement('div');
            box.className = 'feedback-input-container';
            box.innerHTML = '<input type="text" class="feedback-text-input" placeholder="Please explain how this answer could be improved...">'
                + '<button class="primary feedback-submit">Submit</button>';
            messageDiv.appendChild(box);
            const field = box.querySelector('input');
            field.focus();

            const submit = () => {
                const feedback = field.value.trim();
                if (!feedback || inFlight) return;
                box.remove();
                note.textContent = 'Thanks for your feedback: "' + feedback + '"';
                run({
                    command: 'improvementFeedback',
                    originalQuery: messageDiv.getAttribute('data-query') || '',
                    feedback: feedback,
                    messageId: messageId
                });
            };
            box.querySelector('button').addEventListener('click', submit);
            field.addEventListener('keypress', e => { if (e.key === 'Enter') submit(); });
        }

        chat.addEventListener('click', e => {
            const button = e.target.closest('.feedback-button');
            if (!button) return;
            provideFeedback(button.closest('.message'), button.classList.contains('thumbs-up'));
        });
        sendButton.addEventListener('click', sendMessage);
        input.addEventListener('keypress', e => { if (e.key === 'Enter') sendMessage(); });
        document.getElementById('close-button').addEventListener('click', async () => {
            await fetch('/api/close', { method: 'POST' });
            setBusy(true);
            document.getElementById('helper-status').textContent = 'closed';
        });

        // Initial fetch and auto-refresh
        refresh();
        setInterval(refresh, 2000);
    </script>
</body>
</html>
"#;
