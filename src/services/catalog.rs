//! Storefront read side: listings, category and brand pages, the home feed.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::category::CategoryBranch;
use crate::domain::aggregates::{Brand, Category, CategoryTree, Product, ProductCard, ProductDetail, ProductVariation};
use crate::store::{CatalogStore, Page, ProductQuery, Store, StoreError, StoreResult};

pub const HOME_SECTION_SIZE: u32 = 12;
pub const BESTSELLER_WINDOW_DAYS: i64 = 90;

/// Query-string filters of the product listing. `brand` and `cat` are slugs.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub q: Option<String>,
    pub brand: Option<String>,
    pub cat: Option<String>,
    pub page: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HomeFeed {
    pub newest: Vec<ProductCard>,
    pub discounted: Vec<ProductCard>,
    pub bestsellers: Vec<ProductCard>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CategoryPage {
    pub category: Category,
    /// Root first.
    pub path: Vec<Category>,
    pub children: Vec<Category>,
    pub products: Page<ProductCard>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BrandPage {
    pub brand: Brand,
    pub products: Page<ProductCard>,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    /// Unknown brand or category slugs match nothing.
    pub async fn list_products(&self, filter: &ProductFilter) -> StoreResult<Page<ProductCard>> {
        let page = filter.page.unwrap_or(1);
        let mut query = ProductQuery { search: filter.q.clone(), page, ..Default::default() };

        if let Some(slug) = filter.brand.as_deref().filter(|s| !s.is_empty()) {
            match self.store.brand_by_slug(slug).await? {
                Some(brand) => query.brand_id = Some(brand.id),
                None => return Ok(empty_page(&query)),
            }
        }
        if let Some(slug) = filter.cat.as_deref().filter(|s| !s.is_empty()) {
            let tree = self.tree().await?;
            match find_active_by_slug(&tree, slug) {
                Some(category) => query.category_ids = Some(tree.subtree_ids(category.id)),
                None => return Ok(empty_page(&query)),
            }
        }
        self.card_page(&query).await
    }

    pub async fn product(&self, slug: &str) -> StoreResult<ProductDetail> {
        self.store.product_detail(slug).await?.ok_or(StoreError::NotFound("product"))
    }

    pub async fn category_tree(&self) -> StoreResult<Vec<CategoryBranch>> {
        Ok(self.tree().await?.branches())
    }

    /// Products of an active category and its descendants.
    pub async fn category_page(&self, slug: &str, page: u32) -> StoreResult<CategoryPage> {
        let tree = self.tree().await?;
        let category = find_active_by_slug(&tree, slug).ok_or(StoreError::NotFound("category"))?.clone();
        let query = ProductQuery { category_ids: Some(tree.subtree_ids(category.id)), page, ..Default::default() };
        let products = self.card_page(&query).await?;
        Ok(CategoryPage {
            path: tree.path(category.id).into_iter().cloned().collect(),
            children: tree.children(category.id).into_iter().filter(|c| c.is_active).cloned().collect(),
            category,
            products,
        })
    }

    pub async fn brand_page(&self, slug: &str, page: u32) -> StoreResult<BrandPage> {
        let brand = self.store.brand_by_slug(slug).await?.ok_or(StoreError::NotFound("brand"))?;
        let query = ProductQuery { brand_id: Some(brand.id), page, ..Default::default() };
        let products = self.card_page(&query).await?;
        Ok(BrandPage { brand, products })
    }

    #[tracing::instrument(skip(self))]
    pub async fn home(&self) -> StoreResult<HomeFeed> {
        let newest = self.store.newest_products(HOME_SECTION_SIZE).await?;
        let discounted = self.store.discounted_products(HOME_SECTION_SIZE).await?;
        let since = Utc::now() - Duration::days(BESTSELLER_WINDOW_DAYS);
        let bestsellers = match self.store.bestsellers(since, HOME_SECTION_SIZE).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "bestseller query failed, falling back to newest");
                newest.clone()
            }
        };

        // One round of image and variation lookups for all three sections.
        let (n, d) = (newest.len(), discounted.len());
        let mut all = self.cards(newest.into_iter().chain(discounted).chain(bestsellers).collect()).await?;
        let bestsellers = all.split_off(n + d);
        let discounted = all.split_off(n);
        Ok(HomeFeed { newest: all, discounted, bestsellers })
    }

    async fn tree(&self) -> StoreResult<CategoryTree> {
        Ok(CategoryTree::build(self.store.categories().await?))
    }

    async fn card_page(&self, query: &ProductQuery) -> StoreResult<Page<ProductCard>> {
        let Page { data, total, page, per_page } = self.store.list_products(query).await?;
        Ok(Page { data: self.cards(data).await?, total, page, per_page })
    }

    /// Keeps the order of `products`.
    async fn cards(&self, products: Vec<Product>) -> StoreResult<Vec<ProductCard>> {
        if products.is_empty() { return Ok(vec![]); }
        let mut ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        ids.sort();
        ids.dedup();
        let images: HashMap<Uuid, _> = self.store.main_images(&ids).await?.into_iter().map(|i| (i.product_id, i)).collect();
        let mut variations: HashMap<Uuid, Vec<ProductVariation>> = HashMap::new();
        for v in self.store.active_variations(&ids).await? {
            variations.entry(v.product_id).or_default().push(v);
        }
        Ok(products.into_iter().map(|p| {
            let image = images.get(&p.id).cloned();
            let own = variations.get(&p.id).map(Vec::as_slice).unwrap_or_default();
            ProductCard::new(p, image, own)
        }).collect())
    }
}

fn find_active_by_slug<'t>(tree: &'t CategoryTree, slug: &str) -> Option<&'t Category> {
    tree.iter().find(|c| c.slug.as_str() == slug && c.is_active)
}

fn empty_page<T>(query: &ProductQuery) -> Page<T> {
    Page { data: vec![], total: 0, page: query.page(), per_page: query.per_page() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewBrand, NewCategory, NewImage, NewProduct, NewVariation};
    use rust_decimal_macros::dec;

    async fn seeded() -> (Arc<MemoryStore>, Category, Category) {
        let store = Arc::new(MemoryStore::new());
        let men = store.create_category(NewCategory { name: "Men".into(), parent_id: None }).await.unwrap();
        let shoes = store.create_category(NewCategory { name: "Shoes".into(), parent_id: Some(men.id) }).await.unwrap();
        let nike = store.create_brand(NewBrand { name: "Nike".into() }).await.unwrap();
        let adidas = store.create_brand(NewBrand { name: "Adidas".into() }).await.unwrap();
        for (name, cat, brand) in [("Runner", shoes.id, nike.id), ("Polo", men.id, adidas.id)] {
            store.create_product(NewProduct {
                category_id: cat, brand_id: brand, name: name.into(), description: String::new(),
                price: dec!(100000), discount_price: None,
            }).await.unwrap();
        }
        (store, men, shoes)
    }

    #[tokio::test]
    async fn test_category_filter_includes_descendants() {
        let (store, men, _) = seeded().await;
        let svc = CatalogService::new(store);
        let page = svc.list_products(&ProductFilter { cat: Some(men.slug.to_string()), ..Default::default() }).await.unwrap();
        assert_eq!(page.total, 2);
        let page = svc.list_products(&ProductFilter { cat: Some("shoes".into()), ..Default::default() }).await.unwrap();
        assert_eq!(page.data[0].product.name, "Runner");
    }

    #[tokio::test]
    async fn test_unknown_brand_matches_nothing() {
        let (store, _, _) = seeded().await;
        let svc = CatalogService::new(store);
        let page = svc.list_products(&ProductFilter { brand: Some("puma".into()), ..Default::default() }).await.unwrap();
        assert_eq!(page.total, 0);
        let page = svc.list_products(&ProductFilter { brand: Some("nike".into()), ..Default::default() }).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_category_page_has_breadcrumbs() {
        let (store, men, shoes) = seeded().await;
        let svc = CatalogService::new(store);
        let page = svc.category_page("shoes", 1).await.unwrap();
        assert_eq!(page.path.iter().map(|c| c.id).collect::<Vec<_>>(), vec![men.id, shoes.id]);
        assert!(matches!(svc.category_page("boots", 1).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_listing_cards_carry_image_and_price() {
        let (store, _, _) = seeded().await;
        let runner = store.newest_products(10).await.unwrap().into_iter().find(|p| p.name == "Runner").unwrap();
        for (url, is_main) in [("side.jpg", false), ("front.jpg", true)] {
            store.add_image(runner.id, NewImage { url: url.into(), alt_text: String::new(), is_main }).await.unwrap();
        }
        for (sku, price, stock) in [("RUN-42", Some(dec!(90000)), 0), ("RUN-43", None, 4)] {
            store.add_variation(runner.id, NewVariation {
                color_id: None, size_id: None, sku: sku.into(), barcode: String::new(), price_override: price, stock,
            }).await.unwrap();
        }

        let svc = CatalogService::new(store);
        let page = svc.list_products(&ProductFilter { q: Some("run".into()), ..Default::default() }).await.unwrap();
        let card = &page.data[0];
        assert_eq!(card.main_image.as_ref().map(|i| i.url.as_str()), Some("front.jpg"));
        assert_eq!(card.from_price, dec!(90000));
        assert_eq!(card.variation_count, 2);
        assert!(card.in_stock);

        let feed = svc.home().await.unwrap();
        let polo = feed.newest.iter().find(|c| c.product.name == "Polo").unwrap();
        assert!(polo.main_image.is_none());
        assert_eq!(polo.from_price, dec!(100000));
        assert!(!polo.in_stock);
    }

    #[tokio::test]
    async fn test_home_feed() {
        let (store, _, _) = seeded().await;
        let feed = CatalogService::new(store).home().await.unwrap();
        assert_eq!(feed.newest.len(), 2);
        assert!(feed.discounted.is_empty());
        assert!(feed.bestsellers.is_empty());
    }
}
