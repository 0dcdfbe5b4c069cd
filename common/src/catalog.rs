//! Bundled offline data: the default catalog, combos, delivery zones and
//! payment channels the storefront runs on when no backend is reachable.

use crate::combo::Combo;
use crate::currency::Money;
use crate::delivery::DeliveryZone;
use crate::order::PaymentMethod;
use crate::payment::PaymentInfo;
use crate::product::{Category, Product, ProductId};

#[allow(clippy::too_many_arguments)]
fn product(
    id: &str,
    name: &str,
    description: &str,
    category: Category,
    price_cup: u64,
    price_mlc_cents: u64,
    unit: &str,
    stock: u32,
    min_stock: u32,
    image: &str,
    is_featured: bool,
    sales_count: u32,
) -> Product {
    Product {
        id: ProductId::from(id),
        name: name.into(),
        description: description.into(),
        category,
        price_cup: Money::from_major(price_cup),
        price_mlc: Money::from_minor(price_mlc_cents),
        unit: unit.into(),
        stock,
        min_stock,
        image: image.into(),
        is_featured,
        is_active: true,
        sales_count,
        expiry_date: None,
    }
}

#[rustfmt::skip]
pub fn default_products() -> Vec<Product> {
    use Category::*;
    vec![
        product("1", "Arroz suelto", "Arroz de grano largo premium", Alimentos, 250, 85, "libra", 100, 10, "🍚", true, 45),
        product("2", "Frijoles negros", "Frijoles negros nacionales", Alimentos, 300, 100, "libra", 80, 10, "🫘", true, 38),
        product("3", "Aceite de soya", "Aceite vegetal 1 litro", Alimentos, 800, 270, "litro", 50, 5, "🫒", true, 52),
        product("4", "Azúcar refino", "Azúcar blanca nacional", Alimentos, 200, 70, "libra", 120, 15, "🍬", false, 30),
        product("5", "Pollo troceado", "Pollo congelado importado", Alimentos, 1200, 400, "kg", 30, 5, "🍗", true, 60),
        product("6", "Salchichas", "Salchichas de pollo 500g", Alimentos, 600, 200, "paquete", 45, 8, "🌭", false, 25),
        product("7", "Pasta de tomate", "Pasta de tomate 250g", Alimentos, 350, 120, "unidad", 60, 10, "🍅", false, 20),
        product("8", "Espaguetis", "Pasta espagueti 500g", Alimentos, 280, 95, "paquete", 70, 10, "🍝", false, 18),
        product("9", "Cerveza Cristal", "Cerveza Cristal lata 355ml", Cervezas, 250, 85, "unidad", 200, 20, "🍺", true, 120),
        product("10", "Cerveza Bucanero", "Cerveza Bucanero lata 355ml", Cervezas, 280, 95, "unidad", 180, 20, "🍻", true, 95),
        product("11", "Cerveza Presidente", "Cerveza importada 355ml", Cervezas, 350, 120, "unidad", 100, 10, "🥂", false, 40),
        product("12", "Malta Bucanero", "Malta lata 355ml", Refrescos, 200, 70, "unidad", 150, 15, "🥫", false, 35),
        product("13", "Refresco Cola", "Cola nacional 500ml", Refrescos, 180, 60, "unidad", 100, 15, "🥤", false, 28),
        product("14", "Jugo de mango", "Jugo natural 1 litro", Refrescos, 350, 120, "litro", 40, 5, "🧃", true, 22),
        product("15", "Agua mineral", "Ciego Montero 500ml", Refrescos, 100, 35, "unidad", 200, 20, "💧", false, 50),
        product("16", "Detergente líquido", "Multiusos 1 litro", Aseo, 500, 170, "litro", 60, 8, "🧴", false, 15),
        product("17", "Jabón de baño", "Jabón perfumado", Aseo, 150, 50, "unidad", 100, 10, "🧼", false, 22),
        product("18", "Pasta dental", "Con flúor 100ml", Aseo, 300, 100, "unidad", 70, 8, "🪥", true, 18),
        product("19", "Papel higiénico", "Doble hoja x4", Aseo, 400, 135, "paquete", 90, 10, "🧻", false, 30),
    ]
}

#[allow(clippy::too_many_arguments)]
fn combo(
    id: &str,
    name: &str,
    description: &str,
    price_cup: u64,
    price_mlc_cents: u64,
    savings_cup: u64,
    items: &[&str],
    image: &str,
) -> Combo {
    Combo {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        price_cup: Money::from_major(price_cup),
        price_mlc: Money::from_minor(price_mlc_cents),
        savings_cup: Money::from_major(savings_cup),
        // Savings are quoted in CUP; MLC uses the 300:1 shop rate.
        savings_mlc: Money::from_minor((savings_cup * 100 + 150) / 300),
        items: items.iter().map(|i| i.to_string()).collect(),
        image: image.into(),
        is_active: true,
    }
}

#[rustfmt::skip]
pub fn default_combos() -> Vec<Combo> {
    vec![
        combo("c1", "Combo Familiar", "5lb Arroz + 2lb Frijoles + 1L Aceite + 2lb Azúcar", 2800, 950, 500, &["Arroz 5lb", "Frijoles 2lb", "Aceite 1L", "Azúcar 2lb"], "👨‍👩‍👧‍👦"),
        combo("c2", "Combo Fiesta", "12 Cristal + 6 Bucanero + 4 Refrescos", 5500, 1850, 900, &["12 Cristal", "6 Bucanero", "4 Refrescos"], "🎉"),
        combo("c3", "Combo Aseo", "Detergente + 3 Jabones + Pasta dental + Papel x4", 1800, 600, 350, &["Detergente 1L", "3 Jabones", "Pasta dental", "Papel x4"], "✨"),
        combo("c4", "Combo Básico", "3lb Arroz + 1lb Frijoles + 1L Aceite", 1500, 500, 250, &["Arroz 3lb", "Frijoles 1lb", "Aceite 1L"], "🏠"),
    ]
}

fn zone(id: &str, name: &str, fee_cup: u64, fee_mlc_cents: u64, estimated_time: &str) -> DeliveryZone {
    DeliveryZone {
        id: id.into(),
        name: name.into(),
        fee_cup: Money::from_major(fee_cup),
        fee_mlc: Money::from_minor(fee_mlc_cents),
        estimated_time: estimated_time.into(),
        is_active: true,
    }
}

pub fn default_zones() -> Vec<DeliveryZone> {
    vec![
        zone("z1", "Consolación del Sur (Centro)", 100, 35, "15-25 min"),
        zone("z2", "Pueblo Nuevo", 100, 35, "15-25 min"),
        zone("z3", "La Leña", 150, 50, "20-35 min"),
        zone("z4", "Puerta de Golpe", 200, 70, "25-40 min"),
        zone("z5", "Alonso de Rojas", 250, 85, "30-45 min"),
        zone("z6", "Pilotos", 250, 85, "30-45 min"),
        zone("z7", "Herradura", 300, 100, "35-50 min"),
        zone("z8", "Ceja del Río", 200, 70, "25-40 min"),
        zone("z9", "Santa Clara", 200, 70, "25-40 min"),
        zone("z10", "El Naranjo", 250, 85, "30-45 min"),
        zone("z11", "Entronque de Herradura", 300, 100, "35-50 min"),
        zone("z12", "La Palma", 300, 100, "35-50 min"),
        zone("z13", "Loma de la Güira", 350, 120, "40-55 min"),
        zone("z14", "San Andrés", 250, 85, "30-45 min"),
        zone("z15", "Río Hondo", 300, 100, "35-50 min"),
        zone("z16", "Quiñones", 200, 70, "25-40 min"),
        zone("z17", "Sabana de Cantero", 350, 120, "40-55 min"),
        zone("z18", "Los Palacios", 400, 135, "45-60 min"),
        zone("z19", "San Diego de los Baños", 450, 150, "50-65 min"),
        zone("z20", "Viñales", 500, 170, "55-70 min"),
    ]
}

pub fn default_payment_channels() -> Vec<PaymentInfo> {
    let transfer = |id: &str, name: &str, method: PaymentMethod| PaymentInfo {
        id: id.into(),
        name: name.into(),
        method,
        account: "9225 0123 4567 8901".into(),
        holder: "MercadoCuba SRL".into(),
        instructions: "Envía el comprobante por WhatsApp después de pagar".into(),
        is_active: true,
    };
    vec![
        transfer("pm1", "Transfermóvil", PaymentMethod::Transfermovil),
        transfer("pm2", "EnZona", PaymentMethod::Enzona),
        transfer("pm3", "Transferencia", PaymentMethod::Transfer),
        PaymentInfo {
            id: "pm4".into(),
            name: "Efectivo".into(),
            method: PaymentMethod::Cash,
            account: String::new(),
            holder: String::new(),
            instructions: "Paga al recibir tu pedido".into(),
            is_active: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn bundled_ids_are_unique() {
        let products = default_products();
        let ids: HashSet<_> = products.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids.len(), products.len());

        let zones = default_zones();
        let ids: HashSet<_> = zones.iter().map(|z| z.id.clone()).collect();
        assert_eq!(ids.len(), zones.len());
    }

    #[test]
    fn bundled_products_are_sellable() {
        for p in default_products() {
            assert!(p.is_active, "{} should be active", p.name);
            assert!(p.stock > 0, "{} should be in stock", p.name);
            assert!(!p.price_cup.is_zero());
        }
    }

    #[test]
    fn combos_save_in_both_currencies() {
        let combos = default_combos();
        assert_eq!(combos.len(), 4);
        for c in &combos {
            assert!(!c.items.is_empty());
            assert!(!c.savings_cup.is_zero() && !c.savings_mlc.is_zero());
        }
        // 500 CUP at 300:1.
        assert_eq!(combos[0].savings_mlc, Money(167));
    }

    #[test]
    fn first_payment_channel_is_a_transfer() {
        let channels = default_payment_channels();
        assert_eq!(channels[0].method, PaymentMethod::Transfermovil);
        assert!(channels.iter().any(|c| c.method == PaymentMethod::Cash));
    }
}
