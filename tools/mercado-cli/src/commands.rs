use std::io::Write;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use mercado_client::auth::{Registration, StaffKeyGate};
use mercado_client::checkout::{Checkout, CheckoutStep};
use mercado_client::remote::rows::ProfilePatch;
use mercado_client::{
    Client, ClientConfig, LocalPersistence, RemoteBackend, Store, StoreEvent, SyncController,
    SyncOutcome,
};
use mercado_common::currency::Currency;
use mercado_common::order::{DeliveryMethod, OrderId, PaymentMethod};
use mercado_common::product::{Category, ProductId};
use mercado_common::report::{orders_csv, top_products, SalesSummary, StockAlerts};
use mercado_common::user::UserRole;

use crate::render;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the products on sale.
    Catalog {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        search: Option<String>,
        /// Only featured products.
        #[arg(long)]
        featured: bool,
    },
    /// Report the connection and what the startup sync brought in.
    Sync {
        /// Keep running and re-pull on every remote change.
        #[arg(long)]
        follow: bool,
    },
    /// Create an account and sign in.
    Register(RegisterArgs),
    /// Sign in with a phone number, email or name.
    Login {
        contact: String,
        #[arg(long, env = "MERCADO_PASSWORD", hide_env_values = true)]
        password: String,
        /// Refuse accounts without staff access.
        #[arg(long)]
        staff: bool,
    },
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Change the signed-in user's contact details.
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Put items in the cart and place an order.
    Checkout(CheckoutArgs),
    /// List orders, newest first.
    Orders {
        /// Only orders placed with this phone number.
        #[arg(long)]
        phone: Option<String>,
        /// Print every line of each order.
        #[arg(long)]
        detail: bool,
    },
    /// Move an order to its next status.
    Advance { order: String },
    Cancel { order: String },
    /// Mark an order's payment as received.
    Verify { order: String },
    /// Out of stock, low stock and expiring products.
    Alerts,
    /// Sales figures and best sellers, or all orders as CSV.
    Report {
        #[arg(long)]
        csv: bool,
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Bundles on offer and what they save.
    Combos,
    /// Delivery zones and their fees.
    Zones,
    /// Payment channels offered at checkout.
    Payments,
    /// Read commands from standard input until `exit`.
    Shell,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    phone: String,
    #[arg(long, default_value = "")]
    email: String,
    #[arg(long, env = "MERCADO_PASSWORD", hide_env_values = true)]
    password: String,
    /// Repeat the password. Required for staff accounts.
    #[arg(long)]
    confirm: Option<String>,
    #[arg(long, default_value = "client", value_parser = parse_role)]
    role: UserRole,
    /// Owner's secret key, for admin and vendor accounts.
    #[arg(long, env = "MERCADO_STAFF_KEY", hide_env_values = true)]
    key: Option<String>,
}

#[derive(Args, Debug)]
pub struct CheckoutArgs {
    /// `PRODUCT_ID:QUANTITY`, repeatable.
    #[arg(long = "item", required = true, value_parser = parse_item)]
    items: Vec<(ProductId, u32)>,
    /// Defaults to the signed-in user's name.
    #[arg(long)]
    name: Option<String>,
    /// Defaults to the signed-in user's phone.
    #[arg(long)]
    phone: Option<String>,
    #[arg(long, default_value = "")]
    address: String,
    /// delivery, messenger or pickup.
    #[arg(long, default_value = "delivery", value_parser = parse_method)]
    method: DeliveryMethod,
    /// Delivery zone id, see `zones`.
    #[arg(long)]
    zone: Option<String>,
    /// Payment channel id or method name, see `payments`.
    #[arg(long)]
    payment: Option<String>,
    #[arg(long, default_value = "")]
    notes: String,
}

/// One line typed into `shell`.
#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Command,
}

fn parse_role(s: &str) -> Result<UserRole, String> {
    UserRole::parse(s).ok_or_else(|| format!("unknown role {s:?}"))
}

fn parse_method(s: &str) -> Result<DeliveryMethod, String> {
    DeliveryMethod::parse(s).ok_or_else(|| format!("unknown delivery method {s:?}"))
}

fn parse_item(s: &str) -> Result<(ProductId, u32), String> {
    let (id, qty) = s.rsplit_once(':').unwrap_or((s, "1"));
    let qty: u32 = qty.parse().map_err(|_| format!("bad quantity in {s:?}"))?;
    if id.is_empty() || qty == 0 {
        return Err(format!("expected PRODUCT_ID:QUANTITY, got {s:?}"));
    }
    Ok((ProductId(id.to_string()), qty))
}

/// Split a shell line on whitespace, keeping double-quoted runs together.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut quoted = false;
    let mut started = false;
    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                started = true;
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    words.push(std::mem::take(&mut word));
                    started = false;
                }
            }
            c => {
                word.push(c);
                started = true;
            }
        }
    }
    if started {
        words.push(word);
    }
    words
}

pub struct App<B> {
    store: Store,
    events: UnboundedReceiver<StoreEvent>,
    sync: SyncController<B>,
    backend: Option<Rc<B>>,
    worker: Option<JoinHandle<()>>,
    outcome: SyncOutcome,
    timeout: Duration,
    key_gate: StaffKeyGate,
}

impl<B: RemoteBackend + 'static> App<B> {
    /// Wire the store, start the write-through worker and run the startup sync.
    pub async fn start(
        config: &ClientConfig,
        local: LocalPersistence,
        backend: Option<Rc<B>>,
        currency: Currency,
    ) -> Self {
        let Client {
            mut store,
            mut events,
            sync,
            worker,
        } = Client::assemble(config, local, backend.clone());
        if store.currency() != currency {
            store.toggle_currency();
        }
        let worker = worker.map(tokio::task::spawn_local);
        let outcome = sync.startup().await;
        store.drain(&mut events);
        if let SyncOutcome::Unreachable(reason) = &outcome {
            tracing::warn!("working offline: {reason}");
        }
        Self {
            store,
            events,
            sync,
            backend,
            worker,
            outcome,
            timeout: config.remote_timeout,
            key_gate: StaffKeyGate::new(),
        }
    }

    /// Run `command`, then wait for pending remote writes.
    pub async fn run(mut self, command: Command) -> anyhow::Result<()> {
        let result = match command {
            Command::Shell => self.shell().await,
            command => self.execute(command).await,
        };
        self.store.detach_remote();
        if let Some(worker) = self.worker.take() {
            worker.await.context("write-through worker")?;
        }
        self.store.drain(&mut self.events);
        result
    }

    fn require_staff(&self) -> anyhow::Result<()> {
        if self.store.is_admin() {
            Ok(())
        } else {
            bail!("sign in with an admin or vendor account first")
        }
    }

    fn find_order(&self, key: &str) -> anyhow::Result<OrderId> {
        self.store
            .orders()
            .iter()
            .find(|o| o.id.0 == key || o.order_number.0.eq_ignore_ascii_case(key))
            .map(|o| o.id.clone())
            .ok_or_else(|| anyhow!("no order {key}"))
    }

    async fn shell(&mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("mercado> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            self.store.drain(&mut self.events);
            let words = split_words(&line);
            match words.first().map(String::as_str) {
                None => continue,
                Some("exit" | "quit") => break,
                Some(_) => {}
            }
            match ShellLine::try_parse_from(words) {
                Ok(ShellLine {
                    command: Command::Shell,
                }) => println!("already in the shell"),
                Ok(ShellLine { command }) => {
                    if let Err(e) = self.execute(command).await {
                        println!("error: {e:#}");
                    }
                }
                Err(e) => {
                    let _ = e.print();
                }
            }
        }
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> anyhow::Result<()> {
        let currency = self.store.currency();
        match command {
            Command::Catalog {
                category,
                search,
                featured,
            } => {
                self.store.set_category(category.map(Category::from));
                self.store.set_search_query(search.unwrap_or_default());
                let products = if featured {
                    self.store.featured_products()
                } else {
                    self.store.visible_products()
                };
                for p in &products {
                    println!("{}", render::product(p, currency));
                }
                println!("{} products", products.len());
            }
            Command::Sync { follow } => {
                match &self.outcome {
                    SyncOutcome::Offline => println!("offline: no remote configured"),
                    SyncOutcome::Unreachable(reason) => println!("offline: {reason}"),
                    SyncOutcome::Connected => println!("connected"),
                }
                println!(
                    "{} products, {} orders, {} zones",
                    self.store.products().len(),
                    self.store.orders().len(),
                    self.store.delivery_zones().len()
                );
                if follow && self.outcome == SyncOutcome::Connected {
                    self.follow().await;
                }
            }
            Command::Register(args) => {
                let registration = Registration {
                    name: args.name,
                    phone: args.phone,
                    email: args.email,
                    password: args.password,
                    confirm: args.confirm,
                    role: args.role,
                };
                let backend = self.backend.as_deref();
                let staff_key = args.key.as_deref().map(|k| (&mut self.key_gate, k));
                let user = self
                    .store
                    .register(backend, &registration, staff_key, self.timeout)
                    .await?;
                println!("registered {}", render::user(user));
            }
            Command::Login {
                contact,
                password,
                staff,
            } => {
                let backend = self.backend.as_deref();
                let user = self
                    .store
                    .sign_in(backend, &contact, &password, staff, self.timeout)
                    .await?;
                println!("signed in as {}", render::user(user));
            }
            Command::Logout => {
                self.store.logout();
                println!("signed out");
            }
            Command::Whoami => match self.store.user() {
                Some(user) => println!("{}", render::user(user)),
                None => println!("not signed in"),
            },
            Command::Profile { name, phone, email } => {
                if !self.store.update_profile(ProfilePatch { name, phone, email }) {
                    bail!("not signed in");
                }
                if let Some(user) = self.store.user() {
                    println!("{}", render::user(user));
                }
            }
            Command::Checkout(args) => self.checkout(args)?,
            Command::Orders { phone, detail } => {
                let orders = match phone {
                    Some(phone) => self.store.orders_for_customer(&phone),
                    None => self.store.orders().iter().collect(),
                };
                for o in &orders {
                    if detail {
                        println!("{}", render::order_detail(o));
                    } else {
                        println!("{}", render::order(o));
                    }
                }
                println!("{} orders", orders.len());
            }
            Command::Advance { order } => {
                self.require_staff()?;
                let id = self.find_order(&order)?;
                let status = self.store.advance_order(&id)?;
                println!("{order}: {}", status.label());
            }
            Command::Cancel { order } => {
                self.require_staff()?;
                let id = self.find_order(&order)?;
                self.store.cancel_order(&id)?;
                println!("{order}: cancelado");
            }
            Command::Verify { order } => {
                self.require_staff()?;
                let id = self.find_order(&order)?;
                if self.store.verify_payment(&id)? {
                    println!("{order}: pago verificado");
                } else {
                    println!("{order}: el pago ya estaba verificado");
                }
            }
            Command::Alerts => {
                let today = Local::now().date_naive();
                let alerts = StockAlerts::collect(self.store.products(), today);
                println!("{}", render::alerts(&alerts));
            }
            Command::Report { csv, top } => {
                self.require_staff()?;
                if csv {
                    println!("{}", orders_csv(self.store.orders()));
                } else {
                    let today = Local::now().date_naive();
                    for &in_currency in Currency::all() {
                        let summary = SalesSummary::compute(self.store.orders(), in_currency, today);
                        println!("{}", render::sales(&summary));
                    }
                    println!("más vendidos:");
                    for p in top_products(self.store.products(), top) {
                        println!("  {} ({})", p.name, p.sales_count);
                    }
                }
            }
            Command::Combos => {
                for c in self.store.active_combos() {
                    println!("{}", render::combo(c, currency));
                }
            }
            Command::Zones => {
                for z in self.store.delivery_zones() {
                    println!("{}", render::zone(z, currency));
                }
            }
            Command::Payments => {
                for p in self.store.active_payment_channels() {
                    println!("{}", render::payment(p));
                }
            }
            Command::Shell => bail!("already in the shell"),
        }
        Ok(())
    }

    fn checkout(&mut self, args: CheckoutArgs) -> anyhow::Result<()> {
        self.store.clear_cart();
        for (id, quantity) in &args.items {
            let product = self
                .store
                .product(id)
                .cloned()
                .with_context(|| format!("no product {id}, see `catalog`"))?;
            if !self.store.add_to_cart(&product) {
                bail!("{} is out of stock", product.name);
            }
            let capped = (*quantity).min(product.stock);
            if capped < *quantity {
                println!("only {capped} of {} available", product.name);
            }
            self.store.update_cart_qty(id, capped);
        }

        let mut checkout = Checkout::new(&self.store);
        {
            let form = checkout.form_mut();
            if let Some(name) = args.name {
                form.customer_name = name;
            }
            if let Some(phone) = args.phone {
                form.customer_phone = phone;
            }
            form.customer_address = args.address;
            form.delivery_method = args.method;
            form.zone_id = args.zone;
            form.notes = args.notes;
        }
        if let Some(payment) = args.payment {
            let channel = self
                .store
                .active_payment_channels()
                .into_iter()
                .find(|p| p.id == payment || PaymentMethod::parse(&payment) == Some(p.method))
                .with_context(|| format!("no payment channel {payment}, see `payments`"))?;
            checkout.form_mut().payment_channel = Some(channel.id.clone());
        }
        while checkout.step() != CheckoutStep::Review {
            checkout.advance(&self.store)?;
        }
        println!("{}", render::quote(&checkout.quote(&self.store)));
        let confirmation = checkout.confirm(&mut self.store)?;
        println!("{}", render::confirmation(&confirmation));
        Ok(())
    }

    /// Apply events as they arrive until the feeds end or Ctrl-C.
    async fn follow(&mut self) {
        let Self {
            store,
            events,
            sync,
            ..
        } = self;
        let apply = async {
            while let Some(event) = events.next().await {
                let pulled = matches!(
                    event,
                    StoreEvent::ProductsPulled { .. } | StoreEvent::OrdersPulled { .. }
                );
                store.apply(event);
                if pulled {
                    println!(
                        "updated: {} products, {} orders",
                        store.products().len(),
                        store.orders().len()
                    );
                }
            }
        };
        tokio::select! {
            _ = sync.follow_changes() => {}
            _ = apply => {}
            _ = tokio::signal::ctrl_c() => println!("stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_arguments() {
        assert_eq!(parse_item("p1:3").unwrap(), (ProductId("p1".into()), 3));
        assert_eq!(parse_item("p1").unwrap(), (ProductId("p1".into()), 1));
        assert!(parse_item("p1:0").is_err());
        assert!(parse_item(":2").is_err());
        assert!(parse_item("p1:x").is_err());
    }

    #[test]
    fn shell_words() {
        assert_eq!(
            split_words(r#"register --name "Ana María" --phone 5351234567"#),
            vec!["register", "--name", "Ana María", "--phone", "5351234567"]
        );
        assert_eq!(split_words("  "), Vec::<String>::new());
        assert_eq!(split_words(r#"login """#), vec!["login", ""]);
    }

    #[test]
    fn shell_lines_parse_as_commands() {
        let line = ShellLine::try_parse_from(split_words("checkout --item p1:2 --method pickup")).unwrap();
        match line.command {
            Command::Checkout(args) => {
                assert_eq!(args.items, vec![(ProductId("p1".into()), 2)]);
                assert_eq!(args.method, DeliveryMethod::Pickup);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
