use crate::dashboard::DashboardSnapshot;

pub fn render_dashboard(snapshot: &DashboardSnapshot) -> String {
    let error_block = match &snapshot.error {
        Some(message) => format!(
            r#"<div class="notice" id="notice">{} <button id="retry-btn" type="button">Try again</button></div>"#,
            escape_html(message)
        ),
        None => r#"<div class="notice" id="notice" hidden></div>"#.to_owned(),
    };

    PAGE.replace("{{STEPS}}", &snapshot.steps.to_string())
        .replace("{{CALORIES}}", &snapshot.calories.to_string())
        .replace("{{MINUTES}}", &snapshot.workout_minutes.to_string())
        .replace("{{UPDATED}}", &escape_html(&snapshot.last_updated_text()))
        .replace("{{NOTICE}}", &error_block)
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>FitTrackr</title>
  <style>
    :root {
      --accent: #2e7d32;
      --accent-dark: #1b5e20;
      --ink: #263238;
    }

    body {
      margin: 0;
      font-family: "Trebuchet MS", sans-serif;
      color: var(--ink);
      background: linear-gradient(170deg, var(--accent), var(--accent-dark));
      min-height: 100vh;
    }

    .app {
      max-width: 560px;
      margin: 0 auto;
      padding: 36px 24px;
    }

    h1 {
      color: white;
      margin: 0 0 4px;
    }

    .subtitle {
      color: rgba(255, 255, 255, 0.85);
      margin: 0 0 24px;
      font-size: 0.95rem;
    }

    .panel {
      background: white;
      border-radius: 16px;
      padding: 20px;
      margin-bottom: 18px;
      box-shadow: 0 10px 24px rgba(0, 0, 0, 0.18);
    }

    .tiles {
      display: grid;
      grid-template-columns: repeat(3, 1fr);
      gap: 12px;
      text-align: center;
    }

    .tiles .label {
      display: block;
      color: #78909c;
      font-size: 0.85rem;
    }

    .tiles .value {
      font-size: 1.5rem;
      font-weight: bold;
    }

    .meta {
      margin-top: 12px;
      color: #78909c;
      font-size: 0.85rem;
    }

    .notice {
      background: #ffebee;
      color: #b71c1c;
      border-radius: 10px;
      padding: 12px;
      margin-bottom: 18px;
    }

    form label {
      display: block;
      margin: 10px 0 4px;
      font-size: 0.9rem;
    }

    input {
      width: 100%;
      box-sizing: border-box;
      padding: 8px;
      border: 1px solid #cfd8dc;
      border-radius: 8px;
    }

    button {
      margin-top: 14px;
      padding: 10px 18px;
      border: none;
      border-radius: 10px;
      background: var(--accent);
      color: white;
      font-weight: bold;
      cursor: pointer;
    }

    button[disabled] {
      opacity: 0.6;
      cursor: wait;
    }

    .status {
      min-height: 1.2em;
      font-size: 0.9rem;
      margin-top: 8px;
    }
  </style>
</head>
<body>
  <main class="app">
    <h1>FitTrackr Dashboard</h1>
    <p class="subtitle">Today's stats refresh live as entries are logged.</p>

    {{NOTICE}}

    <section class="panel">
      <div class="tiles">
        <div><span class="label">Steps</span><span id="steps" class="value">{{STEPS}}</span></div>
        <div><span class="label">Calories</span><span id="calories" class="value">{{CALORIES}}</span> kcal</div>
        <div><span class="label">Workout</span><span id="minutes" class="value">{{MINUTES}}</span> min</div>
      </div>
      <p class="meta">Last updated: <span id="updated">{{UPDATED}}</span></p>
      <button id="refresh-btn" type="button">Refresh</button>
    </section>

    <section class="panel">
      <h2>Log workout</h2>
      <form id="workout-form">
        <label for="steps-input">Steps</label>
        <input id="steps-input" name="steps" type="number" min="0" />
        <label for="calories-input">Calories burned</label>
        <input id="calories-input" name="calories" type="number" min="0" />
        <label for="minutes-input">Workout minutes</label>
        <input id="minutes-input" name="workout_minutes" type="number" min="0" />
        <button id="save-btn" type="submit">Save workout</button>
        <p id="status" class="status"></p>
      </form>
    </section>
  </main>

  <script>
    const statusLine = document.getElementById("status");
    const saveButton = document.getElementById("save-btn");

    function applySnapshot(snapshot) {
      document.getElementById("steps").textContent = snapshot.steps;
      document.getElementById("calories").textContent = snapshot.calories;
      document.getElementById("minutes").textContent = snapshot.workout_minutes;
      document.getElementById("updated").textContent = snapshot.last_updated;
      const notice = document.getElementById("notice");
      if (snapshot.error) {
        notice.textContent = snapshot.error;
        notice.hidden = false;
      } else {
        notice.hidden = true;
      }
    }

    async function refresh() {
      const response = await fetch("/api/dashboard/refresh", { method: "POST" });
      if (response.ok) {
        applySnapshot(await response.json());
      }
    }

    document.getElementById("refresh-btn").addEventListener("click", refresh);
    const retryButton = document.getElementById("retry-btn");
    if (retryButton) {
      retryButton.addEventListener("click", refresh);
    }

    document.getElementById("workout-form").addEventListener("submit", async (event) => {
      event.preventDefault();
      if (saveButton.disabled) {
        return;
      }
      const body = {};
      for (const name of ["steps", "calories", "workout_minutes"]) {
        const value = event.target.elements[name].value;
        if (value !== "") {
          body[name] = Number(value);
        }
      }

      saveButton.disabled = true;
      statusLine.textContent = "Saving…";
      try {
        const response = await fetch("/api/workout", {
          method: "POST",
          headers: { "Content-Type": "application/json" },
          body: JSON.stringify(body),
        });
        if (response.ok) {
          statusLine.textContent = "Workout saved";
          event.target.reset();
          await refresh();
        } else {
          statusLine.textContent = await response.text();
        }
      } catch (err) {
        statusLine.textContent = "Could not reach the server";
      } finally {
        saveButton.disabled = false;
      }
    });
  </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_filled() {
        let snapshot = DashboardSnapshot {
            steps: 5000,
            calories: 300,
            workout_minutes: 45,
            updated_at: None,
            error: None,
        };
        let page = render_dashboard(&snapshot);
        assert!(page.contains(">5000<"));
        assert!(page.contains(">300<"));
        assert!(page.contains(">45<"));
        assert!(page.contains("—"));
        assert!(!page.contains("{{"));
    }

    #[test]
    fn error_notice_is_escaped() {
        let snapshot = DashboardSnapshot {
            steps: 0,
            calories: 0,
            workout_minutes: 0,
            updated_at: None,
            error: Some("<script>alert(1)</script>".into()),
        };
        let page = render_dashboard(&snapshot);
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("Try again"));
    }
}
