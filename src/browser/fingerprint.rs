//! Per-session fingerprints
//!
//! Every session gets a randomized but internally consistent identity:
//! user agent, viewport, locale, and timezone, plus an init script that masks
//! the usual automation tells. Rotation across sessions is what keeps a pool
//! of identical processes from presenting as one machine.

/// User agents rotated across sessions
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Common desktop viewports
const VIEWPORTS: &[(u32, u32)] = &[
    (1920, 1080),
    (1366, 768),
    (1536, 864),
    (1440, 900),
    (1680, 1050),
];

/// Timezones paired with plausible locales
const TIMEZONES: &[&str] = &[
    "America/New_York",
    "America/Chicago",
    "America/Los_Angeles",
    "America/Denver",
];

const LOCALES: &[&str] = &["en-US", "en-GB"];

/// Identity attributes applied to one isolated session
#[derive(Debug, Clone)]
pub struct Fingerprint {
    /// User agent string
    pub user_agent: String,
    /// Viewport (width, height)
    pub viewport: (u32, u32),
    /// BCP-47 locale
    pub locale: String,
    /// IANA timezone id
    pub timezone: String,
}

impl Fingerprint {
    /// Mint a randomized fingerprint
    pub fn random() -> Self {
        Self {
            user_agent: pick(USER_AGENTS).to_string(),
            viewport: *pick(VIEWPORTS),
            locale: pick(LOCALES).to_string(),
            timezone: pick(TIMEZONES).to_string(),
        }
    }

    /// Replace the user agent (caller-supplied override from a task spec)
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Init script injected into every new document of the session: hides
    /// `navigator.webdriver`, fakes the chrome runtime object, and aligns
    /// `navigator.languages` with the session locale.
    pub fn init_script(&self) -> String {
        format!(
            r#"
            Object.defineProperty(navigator, 'webdriver', {{
                get: () => undefined,
                configurable: true
            }});

            if (!window.chrome) {{
                window.chrome = {{ runtime: {{}} }};
            }}

            Object.defineProperty(navigator, 'languages', {{
                get: () => ['{locale}', 'en'],
                configurable: true
            }});
            Object.defineProperty(navigator, 'language', {{
                get: () => '{locale}',
                configurable: true
            }});

            Object.defineProperty(navigator, 'plugins', {{
                get: () => {{
                    const plugins = [
                        {{ name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' }},
                        {{ name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer' }},
                        {{ name: 'Native Client', filename: 'internal-nacl-plugin' }}
                    ];
                    plugins.item = (i) => plugins[i];
                    plugins.namedItem = (name) => plugins.find(p => p.name === name);
                    return plugins;
                }},
                configurable: true
            }});

            if (navigator.permissions) {{
                const originalQuery = navigator.permissions.query;
                navigator.permissions.query = (parameters) => (
                    parameters.name === 'notifications' ?
                        Promise.resolve({{ state: Notification.permission }}) :
                        originalQuery(parameters)
                );
            }}
            "#,
            locale = self.locale
        )
    }
}

fn pick<T>(items: &[T]) -> &T {
    &items[rand::random_range(0..items.len())]
}
